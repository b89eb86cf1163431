use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mosaic_cli::{logging, FileDirectory, FsObjectStore, SpoolDispatcher};
use mosaic_core::config::BLOCK_SIZES_KEY;
use mosaic_core::{Collaborators, Pipeline, PipelineConfig, TriggerEvent};
use mosaic_render::{pixelate, BlockSize, RenditionSetBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn cli() -> Command {
    Command::new("mosaic")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Pixelated renditions with per-recipient workflow fan-out")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging for mosaic crates"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("env-file")
                .long("env-file")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Load settings from this file instead of ./.env"),
        )
        .subcommand(
            Command::new("run")
                .about("Process one trigger event against local collaborators")
                .arg(
                    Arg::new("event")
                        .long("event")
                        .required(true)
                        .help("Event JSON file, or - for stdin"),
                )
                .arg(
                    Arg::new("store-root")
                        .long("store-root")
                        .default_value("store")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory holding one subdirectory per bucket"),
                )
                .arg(
                    Arg::new("directory-root")
                        .long("directory-root")
                        .default_value("directory")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory holding <table>.json recipient files"),
                )
                .arg(
                    Arg::new("spool-dir")
                        .long("spool-dir")
                        .default_value("spool")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory receiving one file per started workflow"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Pixelate a single image file")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("block")
                        .long("block")
                        .default_value("16")
                        .help("Block size, N or WxH"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("keys")
                .about("Print destination keys for a source key")
                .arg(Arg::new("source-key").long("source-key").required(true))
                .arg(
                    Arg::new("blocks")
                        .long("blocks")
                        .help("Comma-separated block sizes (defaults to block_sizes or 8,16,32,48,64)"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    match matches.get_one::<PathBuf>("env-file") {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    logging::init(matches.get_flag("verbose"), matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("render", args)) => render(args).await,
        Some(("keys", args)) => keys(args),
        _ => unreachable!("subcommand_required"),
    }
}

async fn run(args: &ArgMatches) -> Result<()> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;

    let event_arg = args
        .get_one::<String>("event")
        .context("--event is required")?;
    let event_json = if event_arg == "-" {
        let mut json = String::new();
        tokio::io::stdin()
            .read_to_string(&mut json)
            .await
            .context("failed to read event from stdin")?;
        json
    } else {
        tokio::fs::read_to_string(event_arg)
            .await
            .with_context(|| format!("failed to read event file {event_arg}"))?
    };
    let event = TriggerEvent::from_json(&event_json)?;

    let store_root = path_arg(args, "store-root")?;
    let directory_root = path_arg(args, "directory-root")?;
    let spool_dir = path_arg(args, "spool-dir")?;

    let directory = FileDirectory::for_table(&directory_root, &config.recipient_table);
    tracing::info!(
        store = %store_root.display(),
        directory = %directory.path().display(),
        spool = %spool_dir.display(),
        "using local collaborators"
    );

    let collaborators = Collaborators::new(
        Arc::new(FsObjectStore::new(store_root)),
        Arc::new(directory),
        Arc::new(SpoolDispatcher::new(spool_dir)),
    );
    let pipeline = Pipeline::new(config, collaborators);

    let response = pipeline.invoke(&event).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    std::process::exit(if response.is_success() { 0 } else { 1 });
}

async fn render(args: &ArgMatches) -> Result<()> {
    let input = path_arg(args, "input")?;
    let output = path_arg(args, "output")?;
    let block: BlockSize = args
        .get_one::<String>("block")
        .context("--block is required")?
        .parse()?;

    let source = tokio::fs::read(&input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let rendered = tokio::task::spawn_blocking(move || pixelate(&source, block)).await??;
    tokio::fs::write(&output, rendered)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(input = %input.display(), output = %output.display(), block_size = %block, "rendered");
    Ok(())
}

fn keys(args: &ArgMatches) -> Result<()> {
    let source_key = args
        .get_one::<String>("source-key")
        .context("--source-key is required")?;
    let blocks = resolve_blocks(
        args.get_one::<String>("blocks").map(String::as_str),
        |key| std::env::var(key).ok(),
    )?;

    for key in RenditionSetBuilder::new(blocks).destination_keys(source_key) {
        println!("{key}");
    }
    Ok(())
}

// --blocks, then the block_sizes setting in either case, then the defaults
fn resolve_blocks<F>(explicit: Option<&str>, lookup: F) -> Result<Vec<BlockSize>>
where
    F: Fn(&str) -> Option<String>,
{
    let configured = explicit.map(str::to_string).or_else(|| {
        lookup(BLOCK_SIZES_KEY).or_else(|| lookup(&BLOCK_SIZES_KEY.to_ascii_uppercase()))
    });
    match configured {
        Some(list) => Ok(BlockSize::parse_list(&list)?),
        None => Ok(BlockSize::defaults()),
    }
}

fn path_arg(args: &ArgMatches, name: &str) -> Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("--{name} is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn blocks_resolve_in_precedence_order() {
        let upper = |key: &str| (key == "BLOCK_SIZES").then(|| "32,8".to_string());

        assert_eq!(
            resolve_blocks(Some("16"), upper).unwrap(),
            vec![BlockSize::square(16)]
        );
        assert_eq!(
            resolve_blocks(None, upper).unwrap(),
            vec![BlockSize::square(32), BlockSize::square(8)]
        );
        assert_eq!(resolve_blocks(None, |_| None).unwrap(), BlockSize::defaults());
        assert!(resolve_blocks(Some("0"), |_| None).is_err());
    }

    #[test]
    fn run_requires_event() {
        let result = cli().try_get_matches_from(["mosaic", "run"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["mosaic", "keys", "--source-key", "cat.png", "-v"])
            .unwrap();
        assert!(matches.get_flag("verbose"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "keys");
        assert_eq!(sub.get_one::<String>("source-key").unwrap(), "cat.png");
    }
}
