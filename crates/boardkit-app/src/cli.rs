//! Command-line argument parsing with clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// BoardKit - build dashboards from a catalog of widgets.
#[derive(Parser, Debug, Clone)]
#[command(name = "boardkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML). Defaults apply when it does not exist.
    #[arg(short, long, env = "BOARDKIT_CONFIG", default_value = "boardkit.toml")]
    pub config: PathBuf,

    /// Board directory, overriding the configured one.
    #[arg(short, long, env = "BOARDKIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Fixture file answering data requests offline.
    #[arg(long, env = "BOARDKIT_FIXTURES")]
    pub fixtures: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    #[default]
    Table,
    /// JSON for scripting.
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the component catalog.
    Catalog {
        /// Only this category.
        #[arg(long)]
        category: Option<String>,
        /// Only this tag.
        #[arg(long)]
        tag: Option<String>,
        /// Permissions granted to the viewer; permission-gated widgets are hidden
        /// unless listed.
        #[arg(long, value_delimiter = ',')]
        grant: Option<Vec<String>>,
        /// Case-insensitive name search instead of filtering.
        #[arg(long, conflicts_with_all = ["category", "tag", "grant"])]
        search: Option<String>,
    },

    /// Create an empty board.
    New(NewArgs),

    /// List saved boards.
    List,

    /// Lay a board out on the grid surface, fetch its data and print the result.
    Show {
        /// Board id; the last saved board when omitted.
        board: Option<String>,
    },

    /// Check a board record file without saving anything.
    Validate {
        /// Path to a board record (JSON).
        path: PathBuf,
    },

    /// Place a widget on a board.
    Add {
        board: String,
        /// Component type id.
        type_id: String,
        /// Column; the first free slot is used when omitted together with --y.
        #[arg(long, requires = "y")]
        x: Option<u32>,
        /// Row.
        #[arg(long, requires = "x")]
        y: Option<u32>,
    },

    /// Move and resize a widget.
    Move(MoveArgs),

    /// Remove a widget.
    Remove { board: String, instance: String },

    /// Set a widget's configuration from a JSON object.
    Configure {
        board: String,
        instance: String,
        /// JSON object, e.g. '{"unit":"C"}'.
        config: String,
    },

    /// Bind one data field of a widget.
    Bind(BindArgs),

    /// Delete a board.
    Delete { board: String },
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Board name.
    pub name: String,

    /// Tenant owning the board.
    #[arg(long, env = "BOARDKIT_TENANT")]
    pub tenant: String,

    /// User owning the board, for personal boards.
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Mark as the tenant's home board.
    #[arg(long)]
    pub home: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    pub board: String,
    pub instance: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Args, Debug, Clone)]
pub struct BindArgs {
    pub board: String,
    pub instance: String,
    /// Data field name from the component's schema.
    pub field: String,

    /// Bind a literal JSON value.
    #[arg(long = "static", value_name = "JSON", group = "source")]
    pub literal: Option<String>,

    /// Bind a request endpoint.
    #[arg(long, value_name = "ENDPOINT", group = "source")]
    pub request: Option<String>,

    /// Bind a push channel.
    #[arg(long, value_name = "CHANNEL", group = "source")]
    pub channel: Option<String>,

    /// JSON pointer selecting the value inside responses.
    #[arg(long, conflicts_with = "literal")]
    pub select: Option<String>,

    /// Re-fetch requests at this interval.
    #[arg(long, value_name = "MS")]
    pub refresh_ms: Option<u64>,

    /// Scope the binding to one device.
    #[arg(long)]
    pub device: Option<String>,
}
