use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use docdex::{
    Catalog,
    DataDir,
    Store,
    cli::{self, Cli, Command, SourceAction},
    entry::DocVersion,
    error::{self, Error},
    ingestion,
    mcp,
    profile::{ProfileConfig, Profiles},
    search,
    server::{self, AppState},
    store::GENERATION_KEY,
};
use serde_json::json;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = Store::open(&data_dir.store_db())?;

    match cli.command {
        Command::Source { action } => match action {
            SourceAction::Add { path, version } => {
                source_add(&store, &path, version)?;
            }
            SourceAction::Remove { version } => {
                source_remove(&store, version)?;
            }
            SourceAction::List { json } => {
                source_list(&store, json)?;
            }
        },
        Command::Build(args) => {
            cmd_build(&store, &data_dir, &args)?;
        }
        Command::Search(args) => {
            cmd_search(&store, &args)?;
        }
        Command::Entry(args) => {
            cmd_entry(&store, &args)?;
        }
        Command::Serve(args) => {
            cmd_serve(store, &data_dir, &args)?;
        }
        Command::Mcp(args) => {
            mcp::run_mcp(store, Duration::from_millis(args.timeout_ms))?;
        }
        Command::Status(args) => {
            cmd_status(&store, &data_dir, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

/// `--profiles` if given, else `profiles.json` in the data directory, else
/// the built-in profiles.
fn load_profiles(
    path: Option<&Path>,
    data_dir: &DataDir,
) -> error::Result<Profiles> {
    match path.map(Path::to_path_buf).or_else(|| data_dir.profiles_file()) {
        Some(path) => {
            debug!(path = %path.display(), "loading page profiles");
            ProfileConfig::load(&path)?.compile()
        }
        None => Ok(Profiles::builtin()),
    }
}

fn source_add(
    store: &Store,
    path: &Path,
    version: DocVersion,
) -> error::Result<()> {
    if !path.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            path.display()
        )));
    }
    let abs_path = path.canonicalize().map_err(|e| {
        Error::Config(format!("cannot resolve path {}: {e}", path.display()))
    })?;
    let Some(abs_str) = abs_path.to_str() else {
        return Err(Error::Config(format!(
            "path is not valid UTF-8: {}",
            abs_path.display()
        )));
    };

    if let Some(previous) = store.get_source(version)? {
        warn!(version, %previous, "replacing registered source");
    }
    store.set_source(version, abs_str)?;
    println!("Registered version {version} -> {abs_str}");
    Ok(())
}

fn source_remove(store: &Store, version: DocVersion) -> error::Result<()> {
    if !store.remove_source(version)? {
        return Err(Error::NotFound {
            kind: "source",
            name: version.to_string(),
        });
    }
    store.remove_version(version)?;
    println!("Removed version {version}");
    Ok(())
}

fn source_list(store: &Store, json: bool) -> error::Result<()> {
    let sources = store.list_sources()?;

    if json {
        let items: Vec<_> = sources
            .iter()
            .map(|(v, path)| json!({ "version": v, "path": path }))
            .collect();
        println!("{}", serde_json::to_string(&items)?);
    } else if sources.is_empty() {
        println!("No sources registered.");
    } else {
        for (v, path) in &sources {
            println!("{v}\t{path}");
        }
    }
    Ok(())
}

/// A flag that flips when the user presses Ctrl-C.
fn cancel_on_ctrl_c() -> error::Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::spawn(move || {
        runtime.block_on(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling build");
                flag.store(true, Ordering::SeqCst);
            }
        });
    });
    Ok(cancel)
}

fn cmd_build(
    store: &Store,
    data_dir: &DataDir,
    args: &cli::BuildArgs,
) -> error::Result<()> {
    let profiles = load_profiles(args.profiles.as_deref(), data_dir)?;
    let cancel = cancel_on_ctrl_c()?;
    let metas = ingestion::build(store, &profiles, args.version, &cancel)?;

    for meta in &metas {
        println!(
            "Version {}: {} entries, {} names (ids {}..={})",
            meta.version, meta.entries, meta.names, meta.first_id, meta.last_id
        );
    }
    Ok(())
}

fn cmd_search(store: &Store, args: &cli::SearchArgs) -> error::Result<()> {
    let catalog = Catalog::load(store)?;
    let ranked =
        search::search(&catalog, &args.query, args.version, args.count)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else if ranked.is_empty() {
        println!("No results found.");
    } else {
        for (i, r) in ranked.iter().enumerate() {
            println!("{:>2}. {:<40} {:.1}", i + 1, r.name, r.score);
        }
    }
    Ok(())
}

fn cmd_entry(store: &Store, args: &cli::EntryArgs) -> error::Result<()> {
    let catalog = Catalog::load(store)?;
    let view = search::resolve(
        &catalog,
        store,
        &args.query,
        args.version,
        args.depth,
    )?
    .ok_or_else(|| Error::NotFound {
        kind: "entry",
        name: args.query.clone(),
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{view}");
    }
    Ok(())
}

fn cmd_serve(
    store: Store,
    data_dir: &DataDir,
    args: &cli::ServeArgs,
) -> error::Result<()> {
    let profiles = load_profiles(args.profiles.as_deref(), data_dir)?;
    let state = AppState::new(
        Arc::new(store),
        Arc::new(profiles),
        Duration::from_millis(args.timeout_ms),
        Arc::new(AtomicBool::new(false)),
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;
    runtime.block_on(server::serve(args.addr, Arc::new(state)))
}

fn cmd_status(
    store: &Store,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let sources = store.list_sources()?;
    let versions = store.list_versions()?;
    let generation = store.get_setting_or(GENERATION_KEY, "0")?;

    if json {
        let value = json!({
            "data_dir": data_dir.root().display().to_string(),
            "generation": generation,
            "sources": sources
                .iter()
                .map(|(v, path)| json!({ "version": v, "path": path }))
                .collect::<Vec<_>>(),
            "versions": versions,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Build generation: {generation}");
        println!("Sources: {}", sources.len());
        for (v, path) in &sources {
            println!("  {v}: {path}");
        }
        println!("Versions: {}", versions.len());
        for meta in &versions {
            println!(
                "  {}: {} entries, {} names, ids {}..={}",
                meta.version,
                meta.entries,
                meta.names,
                meta.first_id,
                meta.last_id
            );
        }
    }
    Ok(())
}
