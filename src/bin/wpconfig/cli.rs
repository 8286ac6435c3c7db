use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wpconfig::{Anchor, MutationOptions, Placement, TypeFilter};

#[derive(Parser)]
#[command(
    name = "wpconfig",
    about = "Read and edit wp-config.php as a key-value store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file to operate on. Discovered from the working directory when omitted.
    #[arg(long, global = true, env = "WPCONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Print evaluator and transformer diagnostics.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only print errors.
    #[arg(long, global = true, conflicts_with = "debug")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a new wp-config.php file
    Create(CreateArgs),
    /// Print the value of a constant or variable
    Get(GetArgs),
    /// Add or update a constant or variable
    Set(SetArgs),
    /// Remove a constant or variable
    Delete(NameArgs),
    /// Exit 0 when a constant or variable exists, 1 otherwise
    Has(NameArgs),
    /// Exit 0 when a constant or variable is truthy, 1 otherwise
    IsTrue(NameArgs),
    /// List the constants, variables and includes the file defines
    List(ListArgs),
    /// Refresh the authentication keys and salts
    ShuffleSalts(ShuffleArgs),
    /// Print the path of the config file
    Path,
    /// Open the config file in an editor
    Edit,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum EntryType {
    #[default]
    All,
    Constant,
    Variable,
}

impl From<EntryType> for TypeFilter {
    fn from(value: EntryType) -> Self {
        match value {
            EntryType::All => TypeFilter::All,
            EntryType::Constant => TypeFilter::Constant,
            EntryType::Variable => TypeFilter::Variable,
        }
    }
}

#[derive(Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub dbname: String,
    #[arg(long)]
    pub dbuser: String,
    #[arg(long, default_value = "")]
    pub dbpass: String,
    #[arg(long, default_value = "localhost")]
    pub dbhost: String,
    #[arg(long, default_value = "wp_")]
    pub dbprefix: String,
    #[arg(long, default_value = "utf8")]
    pub dbcharset: String,
    #[arg(long, default_value = "")]
    pub dbcollate: String,
    #[arg(long, default_value = "")]
    pub locale: String,
    /// Read additional PHP from stdin.
    #[arg(long)]
    pub extra_php: bool,
    #[arg(long)]
    pub skip_salts: bool,
    /// Accepted for compatibility; no database connection is attempted.
    #[arg(long)]
    pub skip_check: bool,
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
    /// Retry the salt service without certificate checks.
    #[arg(long)]
    pub insecure: bool,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum GetFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Args)]
pub struct GetArgs {
    pub name: String,
    #[arg(long = "type", value_enum, default_value_t)]
    pub kind: EntryType,
    #[arg(long, value_enum, default_value_t)]
    pub format: GetFormat,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum PlacementArg {
    #[default]
    Before,
    After,
}

impl From<PlacementArg> for Placement {
    fn from(value: PlacementArg) -> Self {
        match value {
            PlacementArg::Before => Placement::Before,
            PlacementArg::After => Placement::After,
        }
    }
}

#[derive(Args)]
pub struct SetArgs {
    pub name: String,
    pub value: String,
    /// Add the entry when it is missing (default).
    #[arg(long, overrides_with = "no_add")]
    pub add: bool,
    /// Fail instead of adding a missing entry.
    #[arg(long, overrides_with = "add")]
    pub no_add: bool,
    /// Write the value as PHP code instead of a string literal.
    #[arg(long)]
    pub raw: bool,
    /// Text new entries are placed next to; `EOF` for the end of the file.
    #[arg(long)]
    pub anchor: Option<String>,
    #[arg(long, value_enum, default_value_t)]
    pub placement: PlacementArg,
    /// Text between a new entry and the anchor. Understands \n, \r and \t.
    #[arg(long)]
    pub separator: Option<String>,
    #[arg(long = "type", value_enum, default_value_t)]
    pub kind: EntryType,
    /// Rewrite an existing statement in canonical form.
    #[arg(long)]
    pub normalize: bool,
}

impl SetArgs {
    pub fn mutation_options(&self) -> MutationOptions {
        let mut options = MutationOptions::default()
            .raw(self.raw)
            .add(self.add || !self.no_add)
            .placement(self.placement.into())
            .normalize(self.normalize);
        if let Some(anchor) = &self.anchor {
            options = options.anchor(Anchor::parse(anchor));
        }
        if let Some(separator) = &self.separator {
            options = options.separator(unescape_separator(separator));
        }
        options
    }
}

#[derive(Args)]
pub struct NameArgs {
    pub name: String,
    #[arg(long = "type", value_enum, default_value_t)]
    pub kind: EntryType,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    #[default]
    Table,
    Csv,
    Json,
    Yaml,
    Dotenv,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only list entries whose name contains one of these.
    pub filters: Vec<String>,
    /// Match filters against the whole name.
    #[arg(long)]
    pub strict: bool,
    #[arg(long, value_delimiter = ',', default_value = "name,value,type")]
    pub fields: Vec<String>,
    #[arg(long, value_enum, default_value_t)]
    pub format: ListFormat,
}

#[derive(Args)]
pub struct ShuffleArgs {
    /// Keys to refresh. Defaults to the eight standard salts.
    pub keys: Vec<String>,
    /// Also refresh keys that are not standard salts.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub insecure: bool,
}

/// Expand the escapes a shell makes awkward to type.
pub fn unescape_separator(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
}
