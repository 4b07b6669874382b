use std::path::PathBuf;

use aitag::tagger::Backend;
use clap::{Args as ClapArgs, Parser, Subcommand};

pub const MODELS_DIR_ENV: &str = "AITAG_MODELS_DIR";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub tag: TagArgs,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Tag a single image (the default command)
#[derive(ClapArgs, Debug)]
pub struct TagArgs {
    /// The image to tag
    pub image: Option<PathBuf>,

    /// Model identifier, resolved to `<models_dir>/<model>.onnx` and `.csv`
    pub model: Option<String>,

    /// Directory holding the model files (default: $AITAG_MODELS_DIR, then `models`)
    pub models_dir: Option<PathBuf>,

    /// Confidence threshold for general tags
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Confidence threshold for character tags
    #[arg(short, long)]
    pub character_threshold: Option<f32>,

    /// Comma-separated tags to leave out
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// Replace underscores in tag names with spaces
    #[arg(long)]
    pub replace_underscore: bool,

    /// Terminate every tag with ", "
    #[arg(long)]
    pub trailing_comma: bool,

    /// JSON file with tagging options; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Backend preference, best first (e.g. `cuda:0,cpu`)
    #[arg(short, long, value_delimiter = ',')]
    pub backend: Vec<Backend>,

    /// Print the scored tags as JSON instead of the tag string
    #[arg(long)]
    pub json: bool,
}

impl TagArgs {
    /// The positional directory, then `AITAG_MODELS_DIR`, then `models`.
    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .clone()
            .or_else(|| std::env::var_os(MODELS_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(aitag::file::MODEL_ROOT))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a model and its tag listing
    Download {
        /// Model identifier
        model: Option<String>,

        /// Directory to store the files in
        #[arg(short, long, env = MODELS_DIR_ENV, default_value = aitag::file::MODEL_ROOT)]
        dir: PathBuf,

        /// Download from this base URL instead of the regional default
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Print the dominant colors of an image as JSON
    Colors {
        image: PathBuf,

        /// Number of colors to extract
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Print the generation metadata of an image as JSON
    Metadata { image: PathBuf },
    /// List the models available locally
    Models {
        #[arg(short, long, env = MODELS_DIR_ENV, default_value = aitag::file::MODEL_ROOT)]
        dir: PathBuf,
    },
}
