use crate::transformer::quote_literal;

const HEAD: &str = r#"<?php
/**
 * The base configuration for WordPress
 *
 * This file contains the following configurations:
 *
 * * Database settings
 * * Secret keys
 * * Database table prefix
 * * ABSPATH
 */

// ** Database settings - You can get this info from your web host ** //
/** The name of the database for WordPress */
define( 'DB_NAME', '' );

/** Database username */
define( 'DB_USER', '' );

/** Database password */
define( 'DB_PASSWORD', '' );

/** Database hostname */
define( 'DB_HOST', 'localhost' );

/** Database charset to use in creating database tables. */
define( 'DB_CHARSET', 'utf8' );

/** The database collate type. Don't change this if in doubt. */
define( 'DB_COLLATE', '' );

/**#@+
 * Authentication unique keys and salts.
 */
"#;

const BODY: &str = r#"
/**#@-*/

/**
 * WordPress database table prefix.
 */
$table_prefix = 'wp_';

"#;

const TAIL: &str = r#"/* That's all, stop editing! Happy publishing. */

/** Absolute path to the WordPress directory. */
if ( ! defined( 'ABSPATH' ) ) {
	define( 'ABSPATH', __DIR__ . '/' );
}

/** Sets up WordPress vars and included files. */
require_once ABSPATH . 'wp-settings.php';
"#;

/// Render the initial config script.
///
/// Database settings keep their placeholder values; `create` writes them
/// afterwards through the transformer.
pub fn render(salts: &[(String, String)], extra_php: Option<&str>) -> String {
    let salts = salts
        .iter()
        .map(|(name, value)| {
            let key = format!("{},", quote_literal(name));
            format!("define( {key:<20} {} );\n", quote_literal(value))
        })
        .collect::<String>();
    let extra = match extra_php.map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("{extra}\n\n"),
        _ => String::new(),
    };
    [HEAD, salts.trim_end_matches('\n'), BODY, extra.as_str(), TAIL].concat()
}
