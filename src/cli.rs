use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// State file holding records, translations and metadata
    #[arg(short, long, default_value = ".appointsync/state.json")]
    pub state: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring a product translation in line with its source product
    CopyProduct {
        /// Source product id
        #[arg(long)]
        from: u64,

        /// Translated product id
        #[arg(long)]
        to: u64,

        /// Language of the translated product
        #[arg(long)]
        lang: String,
    },

    /// Reconcile one linked table between two products
    Reconcile {
        /// Table to reconcile (relationships or availability)
        #[arg(long)]
        table: String,

        /// Source product id
        #[arg(long)]
        source: u64,

        /// Target product id
        #[arg(long)]
        target: u64,
    },

    /// Write a metadata value the way the host platform would
    SetMeta {
        /// Owner record id
        #[arg(long)]
        owner: u64,

        /// Metadata key
        #[arg(long)]
        key: String,

        /// Value, parsed as JSON when possible
        #[arg(long)]
        value: String,
    },

    /// Read metadata the way the host platform would
    GetMeta {
        /// Owner record id
        #[arg(long)]
        owner: u64,

        /// Metadata key (all keys when omitted)
        #[arg(long)]
        key: Option<String>,

        /// Read as a front-end visitor instead of the back office
        #[arg(long)]
        visitor: bool,
    },

    /// Detach a staff member from a product and its translations
    RemoveStaff {
        /// Product id
        #[arg(long)]
        product: u64,

        /// Staff id
        #[arg(long)]
        staff: u64,
    },

    /// Notify that a translation was saved
    TranslationSaved {
        /// Saved record id
        #[arg(long)]
        post: u64,
    },

    /// Assign a new appointment the language of its product
    NewAppointment {
        /// Appointment id
        #[arg(long)]
        id: u64,
    },

    /// Notify an appointment status change
    Transition {
        /// Appointment id
        #[arg(long)]
        id: u64,

        /// Previous status
        #[arg(long)]
        from: String,

        /// New status
        #[arg(long)]
        to: String,
    },

    /// Write the effective configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "appointsync.toml")]
        output: PathBuf,
    },
}

impl Commands {
    /// Whether the command changes state that must be saved
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Commands::GetMeta { .. } | Commands::InitConfig { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copy_product() {
        let args = Args::parse_from([
            "appointsync", "-v", "copy-product", "--from", "10", "--to", "11", "--lang", "fr",
        ]);
        assert!(args.verbose);
        assert_eq!(args.state, PathBuf::from(".appointsync/state.json"));
        match args.command {
            Commands::CopyProduct { from, to, lang } => {
                assert_eq!((from, to, lang.as_str()), (10, 11, "fr"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_read_commands_do_not_save() {
        let args = Args::parse_from(["appointsync", "get-meta", "--owner", "5", "--visitor"]);
        assert!(!args.command.is_mutating());
        let args = Args::parse_from(["appointsync", "new-appointment", "--id", "5"]);
        assert!(args.command.is_mutating());
    }
}
