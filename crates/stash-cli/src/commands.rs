use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use stash_server::{ServerConfig, StashServer};
use stash_store::{ingest, ObjectStore};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Put(args) => cmd_put(&config, args),
        Command::Get(args) => cmd_get(&config, args),
        Command::Ls => cmd_ls(&config, &cli.format),
        Command::Rm(args) => cmd_rm(&config, args),
        Command::Check(args) => cmd_check(&config, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.storage_root = root.clone();
    }
    if let Some(policy) = cli.key_policy {
        config.key_policy = policy;
    }
    tracing::debug!(
        root = %config.storage_root.display(),
        key_policy = %config.key_policy,
        "resolved configuration"
    );
    Ok(config)
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(max_size) = args.max_size {
        config.max_size = max_size;
    }
    if args.no_sniff {
        config.sniff_content = false;
    }

    let server = StashServer::new(config)?;
    println!(
        "{} stash server on {} (root: {}, keys: {})",
        "✓".green().bold(),
        server.config().bind_addr.to_string().bold(),
        server.config().storage_root.display(),
        server.config().key_policy.to_string().cyan(),
    );
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_put(config: &ServerConfig, args: PutArgs) -> anyhow::Result<()> {
    let data = fs::read(&args.path)
        .with_context(|| format!("cannot read {}", args.path.display()))?;
    let display_name = match args.name {
        Some(name) => name,
        None => args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let content_type = args
        .content_type
        .unwrap_or_else(|| guess_content_type(&args.path).to_string());

    let store = config.open_store()?;
    let stored = ingest(&store, &config.policy(), &display_name, &content_type, &data)?;
    println!("{} Stored {}", "✓".green().bold(), stored.key.to_string().yellow());
    println!("  Name: {}", stored.metadata.display_name);
    println!("  Type: {}", stored.metadata.content_type.cyan());
    println!("  Size: {} bytes", stored.metadata.size_bytes);
    Ok(())
}

fn cmd_get(config: &ServerConfig, args: GetArgs) -> anyhow::Result<()> {
    let store = config.open_store()?;
    let object = store.get(&args.key)?;
    match args.output {
        Some(path) => {
            fs::write(&path, &object.data)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!(
                "{} Wrote {} bytes to {}",
                "✓".green(),
                object.data.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&object.data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_ls(config: &ServerConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let entries = config.open_store()?.list()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No files stored.");
            }
            for entry in &entries {
                println!(
                    "{}  {:>10}  {:<24}  {}",
                    entry.stored_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    entry.size_bytes,
                    entry.content_type.cyan(),
                    entry.key.to_string().yellow(),
                );
            }
        }
    }
    Ok(())
}

fn cmd_rm(config: &ServerConfig, args: RmArgs) -> anyhow::Result<()> {
    let store = config.open_store()?;
    store.delete(&args.key)?;
    println!("{} Deleted {}", "✓".green(), args.key.yellow());
    Ok(())
}

fn cmd_check(config: &ServerConfig, args: CheckArgs) -> anyhow::Result<()> {
    config.policy().check(args.size, &args.content_type)?;
    println!(
        "{} {} bytes of {} would be accepted",
        "✓".green().bold(),
        args.size,
        args.content_type.cyan()
    );
    Ok(())
}

/// MIME type for the extensions the standard allow-list covers.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" | "text" | "log" => "text/plain",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use stash_store::KeyPolicy;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(guess_content_type(Path::new("cat.PNG")), "image/png");
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_content_type(Path::new("setup.exe")), "application/octet-stream");
        assert_eq!(guess_content_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "stash", "ls", "--root", "/srv/files", "--key-policy", "original-name",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.storage_root, Path::new("/srv/files"));
        assert_eq!(config.key_policy, KeyPolicy::OriginalName);
    }

    #[test]
    fn put_get_rm_against_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let file = dir.path().join("notes.txt");
        fs::write(&file, b"remember the milk").unwrap();

        let config = ServerConfig {
            storage_root: root,
            key_policy: KeyPolicy::OriginalName,
            ..Default::default()
        };
        cmd_put(
            &config,
            PutArgs { path: file, content_type: None, name: None },
        )
        .unwrap();

        let out = dir.path().join("out.txt");
        cmd_get(
            &config,
            GetArgs { key: "notes.txt".into(), output: Some(out.clone()) },
        )
        .unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"remember the milk");

        cmd_rm(&config, RmArgs { key: "notes.txt".into() }).unwrap();
        assert!(cmd_rm(&config, RmArgs { key: "notes.txt".into() }).is_err());
    }

    #[test]
    fn check_reports_rejection() {
        let config = ServerConfig::default();
        assert!(cmd_check(&config, CheckArgs { size: 10, content_type: "image/png".into() }).is_ok());
        assert!(cmd_check(
            &config,
            CheckArgs { size: 10, content_type: "application/x-msdownload".into() }
        )
        .is_err());
    }
}
