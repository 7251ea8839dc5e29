use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use resolver::{
    LogObserver, ResolveFailure, ResolverSettings, accessible_items, calculate_reach, resolve,
};
use resolver_game::world_reader::{read_patches, read_world};
use resolver_game::{GameData, NodeContext};
use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
    #[arg(long)]
    world: PathBuf,

    #[arg(long, num_args = 1.., required = true)]
    patches: Vec<PathBuf>,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    time_limit: Option<f32>,

    // With several patches files, the file name is suffixed with the file's position
    #[arg(long)]
    output_spoiler: Option<PathBuf>,

    #[arg(long)]
    reach_only: bool,
}

fn get_settings(args: &Args) -> Result<ResolverSettings> {
    let mut settings = match &args.settings {
        Some(path) => ResolverSettings::load(path)?,
        None => ResolverSettings::default(),
    };
    if args.max_attempts.is_some() {
        settings.max_attempts = args.max_attempts;
    }
    if args.time_limit.is_some() {
        settings.time_limit_seconds = args.time_limit;
    }
    Ok(settings)
}

fn spoiler_path(base: &Path, i: usize, count: usize) -> PathBuf {
    if count == 1 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, i, ext.to_string_lossy()),
        None => format!("{}-{}", stem, i),
    };
    base.with_file_name(file_name)
}

fn print_reach(game_data: &GameData, patches_path: &Path) -> Result<()> {
    let patches = read_patches(patches_path, game_data)?;
    let resources = patches.starting_resources.clone();
    let ctx = NodeContext::new(game_data, &patches, &resources);
    let reach = calculate_reach(&ctx, patches.starting_location);
    println!("{}: {} nodes reachable", patches_path.display(), reach.len());
    for &node in &reach {
        println!("  {}", game_data.node_name(node));
    }
    for (resource, locations) in accessible_items(&ctx, &reach) {
        let names: Vec<String> = locations.iter().map(|&n| game_data.node_name(n)).collect();
        println!(
            "  {} at {}",
            game_data.resource_name(resource),
            names.join(", ")
        );
    }
    Ok(())
}

// Returns whether the seed is completable.
fn resolve_file(
    game_data: &GameData,
    patches_path: &Path,
    settings: &ResolverSettings,
    output_spoiler: Option<&Path>,
) -> Result<bool> {
    let patches = read_patches(patches_path, game_data)?;
    let mut observer = LogObserver::new();
    match resolve(game_data, &patches, settings, &mut observer) {
        Ok(path) => {
            println!(
                "{}: Completable ({} actions)",
                patches_path.display(),
                path.len()
            );
            if let Some(output) = output_spoiler {
                path.save(output)?;
                info!("Wrote spoiler log to {}", output.display());
            }
            Ok(true)
        }
        Err(ResolveFailure::Unsatisfiable {
            start,
            additional_requirements,
        }) => {
            println!("{}: Unsatisfiable from {}", patches_path.display(), start);
            print!("{}", additional_requirements.pretty_print("  ", game_data));
            Ok(false)
        }
        Err(ResolveFailure::Timeout { attempts }) => {
            println!(
                "{}: Timeout after {} attempts",
                patches_path.display(),
                attempts
            );
            Ok(false)
        }
        Err(ResolveFailure::InvalidInput(err)) => Err(err),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let settings = get_settings(&args)?;
    let game_data = read_world(&args.world)?;
    info!("Loaded world from {}", args.world.display());

    if args.reach_only {
        for patches_path in &args.patches {
            print_reach(&game_data, patches_path)?;
        }
        return Ok(());
    }

    let count = args.patches.len();
    let outputs: Vec<Option<PathBuf>> = (0..count)
        .map(|i| {
            args.output_spoiler
                .as_ref()
                .map(|base| spoiler_path(base, i, count))
        })
        .collect();

    let results: Vec<Result<bool>> = if count == 1 {
        vec![resolve_file(
            &game_data,
            &args.patches[0],
            &settings,
            outputs[0].as_deref(),
        )]
    } else {
        std::thread::scope(|s| {
            let handles: Vec<_> = args
                .patches
                .iter()
                .zip(outputs.iter())
                .map(|(patches_path, output)| {
                    let game_data = &game_data;
                    let settings = &settings;
                    s.spawn(move || resolve_file(game_data, patches_path, settings, output.as_deref()))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => bail!("resolver thread panicked"),
                })
                .collect()
        })
    };

    let mut failures = 0;
    for (patches_path, result) in args.patches.iter().zip(results) {
        match result.with_context(|| format!("while resolving {}", patches_path.display())) {
            Ok(true) => {}
            Ok(false) => failures += 1,
            Err(err) => {
                error!("{:?}", err);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} of {} seeds are not completable", failures, count);
    }
    Ok(())
}
