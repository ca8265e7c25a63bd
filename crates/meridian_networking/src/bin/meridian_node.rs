//! # MERIDIAN Node
//!
//! Runs a local render cluster and drives one frame through it.
//!
//! ## Usage
//!
//! ```bash
//! meridian_node --config cluster.toml --world-size 4
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meridian_core::{BasicFactory, BasicModuleLoader, ObjectKind};
use meridian_networking::{ClusterConfig, ClusterResult, LocalCluster};
use meridian_shared::{Box3f, FrameBufferChannels, FrameBufferFormat, Vec2f, Vec2i, Vec3f};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut world_size: Option<usize> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--world-size" | "-n" => {
                if i + 1 < args.len() {
                    world_size = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: meridian_node [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <FILE>        Cluster configuration (TOML)");
                println!("  -n, --world-size <NUM>     Ranks including the master (default: 3)");
                println!("  -h, --help                 Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match ClusterConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {path}: {err}");
                std::process::exit(2);
            }
        },
        None => ClusterConfig::default(),
    };
    let config = match world_size {
        Some(size) => config.with_world_size(size),
        None => config,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    if let Err(err) = run(config) {
        tracing::error!(%err, "cluster failed");
        std::process::exit(1);
    }
}

fn run(config: ClusterConfig) -> ClusterResult<()> {
    let start = Instant::now();
    let mut cluster = LocalCluster::start(
        config,
        Arc::new(BasicFactory::new()),
        Arc::new(BasicModuleLoader::new(["denoiser"])),
    )?;
    let master = cluster.master()?;

    let code = master.load_module("denoiser")?;
    tracing::info!(code, "module loaded");

    let world = master.new_world()?;
    master.set_param(
        world,
        "bounds",
        Box3f::new(Vec3f::new(0.0, 0.0, 1.0), Vec3f::new(0.5, 0.5, 2.0)),
    )?;
    master.set_param(world, "primID", 7)?;
    master.commit(world)?;

    let camera = master.new_object(ObjectKind::Camera, "perspective")?;
    master.commit(camera)?;

    let renderer = master.new_object(ObjectKind::Renderer, "scivis")?;
    master.set_param(renderer, "pixelSamples", 4)?;
    master.commit(renderer)?;

    let frame_buffer = master.new_frame_buffer(
        Vec2i::new(640, 480),
        FrameBufferFormat::Srgba,
        FrameBufferChannels::COLOR | FrameBufferChannels::ACCUM,
    )?;

    let future = master.render_frame_async(frame_buffer, renderer, camera, world)?;
    match master.future(future) {
        Some(pending) => match pending.wait_timeout(Duration::from_secs(10)) {
            Some(variance) => tracing::info!(variance, "frame finished"),
            None => tracing::warn!("frame did not finish within 10s"),
        },
        None => tracing::warn!(%future, "no future bound on the master"),
    }

    let pick = master.pick(frame_buffer, renderer, camera, world, Vec2f::new(0.25, 0.25))?;
    tracing::info!(hit = pick.is_hit(), prim_id = pick.prim_id, "pick answered");

    for handle in [future, frame_buffer, renderer, camera, world] {
        master.release(handle)?;
    }

    let (master_ctx, workers) = cluster.shutdown()?;
    tracing::info!(
        master_objects = master_ctx.objects.len(),
        workers = workers.len(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "cluster shut down"
    );
    Ok(())
}
