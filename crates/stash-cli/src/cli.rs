use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stash_store::KeyPolicy;

#[derive(Parser)]
#[command(
    name = "stash",
    about = "stash: validated, traversal-safe file storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root directory (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Key policy: timestamped or original-name
    #[arg(long, global = true)]
    pub key_policy: Option<KeyPolicy>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP file server
    Serve(ServeArgs),
    /// Validate and store a local file
    Put(PutArgs),
    /// Write a stored object to a file or stdout
    Get(GetArgs),
    /// List stored objects
    Ls,
    /// Delete a stored object
    Rm(RmArgs),
    /// Evaluate the upload policy without storing anything
    Check(CheckArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Upload limit in bytes
    #[arg(long)]
    pub max_size: Option<u64>,
    /// Trust declared content types without checking file signatures
    #[arg(long)]
    pub no_sniff: bool,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
    /// Declared MIME type (guessed from the extension if omitted)
    #[arg(long)]
    pub content_type: Option<String>,
    /// Display name (defaults to the file name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub key: String,
}

#[derive(Args)]
pub struct CheckArgs {
    pub size: u64,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["stash", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
            assert!(!args.no_sniff);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_rejects_bad_addr() {
        assert!(Cli::try_parse_from(["stash", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn parse_put() {
        let cli = Cli::try_parse_from(["stash", "put", "cat.png", "--content-type", "image/png"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("cat.png"));
            assert_eq!(args.content_type, Some("image/png".into()));
            assert!(args.name.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_output() {
        let cli = Cli::try_parse_from(["stash", "get", "k.txt", "-o", "out.txt"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.key, "k.txt");
            assert_eq!(args.output, Some(PathBuf::from("out.txt")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_ls_and_rm() {
        let cli = Cli::try_parse_from(["stash", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls));
        let cli = Cli::try_parse_from(["stash", "rm", "old.txt"]).unwrap();
        assert!(matches!(cli.command, Command::Rm(RmArgs { ref key }) if key == "old.txt"));
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["stash", "check", "1024", "image/png"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert_eq!(args.size, 1024);
            assert_eq!(args.content_type, "image/png");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_options() {
        let cli = Cli::try_parse_from([
            "stash", "ls", "--root", "/tmp/up", "--key-policy", "original-name", "--format", "json", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/up")));
        assert_eq!(cli.key_policy, Some(KeyPolicy::OriginalName));
    }

    #[test]
    fn parse_rejects_unknown_key_policy() {
        assert!(Cli::try_parse_from(["stash", "ls", "--key-policy", "random"]).is_err());
    }
}
