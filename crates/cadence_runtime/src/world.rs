//! Headless world: a few update functions over a body array, periodic
//! bookkeeping tasks and one streamed collection.

use anyhow::{Context, Result};
use cadence_asset::{
    schedule_incremental_preload, AssetServices, CollectionDescriptor, CollectionEntry,
    CollectionResource, MemoryResourceManager, NameRegistry, ResourceKindRegistry,
};
use cadence_core::{
    CallbackResult, IntervalScheduler, PhaseExecutor, PriorityClock, TaskDescriptor, TaskKey,
    UpdateContext, UpdateDescriptor, UpdatePhase,
};
use cadence_services::Settings;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ASSET_TYPES: [&str; 5] = ["Texture2D", "Mesh", "Material", "Sound", "Script"];
const WORLD_BOUND: i64 = 10_000;
const PARALLEL_BATCH: usize = 256;

/// Component storage shared by the update functions.
struct Bodies {
    positions: Vec<AtomicI64>,
    velocities: Vec<AtomicI64>,
    bounces: AtomicUsize,
    input_frames: AtomicU64,
    checksum: AtomicI64,
}

impl Bodies {
    fn new(count: usize) -> Self {
        Self {
            positions: (0..count).map(|_| AtomicI64::new(0)).collect(),
            velocities: (0..count)
                .map(|i| AtomicI64::new((i as i64 * 7919) % 41 - 20))
                .collect(),
            bounces: AtomicUsize::new(0),
            input_frames: AtomicU64::new(0),
            checksum: AtomicI64::new(0),
        }
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

fn gather_input(bodies: &Bodies, _ctx: &UpdateContext) -> CallbackResult {
    bodies.input_frames.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn integrate(bodies: &Bodies, ctx: &UpdateContext) -> CallbackResult {
    for i in ctx.range() {
        let velocity = bodies.velocities[i].load(Ordering::Relaxed);
        bodies.positions[i].fetch_add(velocity, Ordering::Relaxed);
    }
    Ok(())
}

fn bounce(bodies: &Bodies, ctx: &UpdateContext) -> CallbackResult {
    let mut bounced = 0;
    for i in ctx.range() {
        let position = bodies.positions[i].load(Ordering::Relaxed);
        if position.abs() > WORLD_BOUND {
            bodies.positions[i].store(position.clamp(-WORLD_BOUND, WORLD_BOUND), Ordering::Relaxed);
            let velocity = bodies.velocities[i].load(Ordering::Relaxed);
            bodies.velocities[i].store(-velocity, Ordering::Relaxed);
            bounced += 1;
        }
    }
    bodies.bounces.fetch_add(bounced, Ordering::Relaxed);
    Ok(())
}

fn publish_transforms(bodies: &Bodies, ctx: &UpdateContext) -> CallbackResult {
    let checksum = ctx
        .range()
        .map(|i| bodies.positions[i].load(Ordering::Relaxed))
        .fold(0i64, |acc, p| acc.wrapping_mul(31).wrapping_add(p));
    bodies.checksum.store(checksum, Ordering::Relaxed);
    Ok(())
}

type UpdateFunction = fn(&Bodies, &UpdateContext) -> CallbackResult;

fn update(bodies: &Arc<Bodies>, name: &str, function: UpdateFunction) -> UpdateDescriptor {
    let key = TaskKey::new(function as usize, Arc::as_ptr(bodies) as usize);
    let bodies = bodies.clone();
    UpdateDescriptor::new(key, name, move |ctx| function(&bodies, ctx))
}

fn register_update_functions(executor: &PhaseExecutor, bodies: &Arc<Bodies>) -> Result<()> {
    let descriptors = [
        update(bodies, "publish_transforms", publish_transforms).phase(UpdatePhase::PostTransform),
        update(bodies, "bounce", bounce)
            .phase(UpdatePhase::Parallel)
            .depends_on(["integrate"])
            .batch_size(PARALLEL_BATCH),
        update(bodies, "integrate", integrate)
            .phase(UpdatePhase::Parallel)
            .batch_size(PARALLEL_BATCH)
            .only_when_active(true),
        update(bodies, "gather_input", gather_input).priority(1.0),
    ];
    for descriptor in descriptors {
        let name = descriptor.name().to_string();
        executor
            .register(descriptor)
            .with_context(|| format!("registering update function '{name}'"))?;
    }

    for phase in UpdatePhase::ALL {
        tracing::debug!(%phase, order = ?executor.execution_order(phase), "phase order");
    }
    Ok(())
}

fn register_tasks(
    scheduler: &IntervalScheduler,
    bodies: &Arc<Bodies>,
    collection: &Arc<CollectionResource>,
) -> Result<()> {
    let instance = Arc::as_ptr(bodies) as usize;

    let collection_ref = Arc::downgrade(collection);
    scheduler.register(
        TaskDescriptor::new(TaskKey::new(1, instance), move |ctx| {
            if let Some(collection) = collection_ref.upgrade() {
                let status = collection.loading_status();
                if !status.finished {
                    tracing::info!(now = ?ctx.now, progress = %format!("{:.1}%", status.progress * 100.0), "preloading");
                }
            }
            Ok(())
        })
        .interval(Duration::from_millis(250)),
    )?;

    let checkpoint_bodies = bodies.clone();
    scheduler.register(
        TaskDescriptor::new(TaskKey::new(2, instance), move |ctx| {
            tracing::debug!(
                since_last = ?ctx.elapsed,
                checksum = checkpoint_bodies.checksum.load(Ordering::Relaxed),
                bounces = checkpoint_bodies.bounces.load(Ordering::Relaxed),
                "checkpoint"
            );
            Ok(())
        })
        .interval(Duration::from_secs(1))
        .only_when_active(true),
    )?;
    Ok(())
}

fn load_descriptor(path: &Path) -> Result<CollectionDescriptor> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let contents = std::fs::read_to_string(path)?;
        return Ok(CollectionDescriptor::from_json(&contents)?);
    }
    let mut reader = BufReader::new(File::open(path)?);
    Ok(CollectionDescriptor::read_from(&mut reader)?)
}

/// Deterministic stand-in content when no collection file is given.
fn demo_descriptor() -> CollectionDescriptor {
    let entries = (0..48u64)
        .map(|i| {
            let asset_type = ASSET_TYPES[i as usize % ASSET_TYPES.len()];
            CollectionEntry::new(asset_type, format!(":demo/{asset_type}/{i:03}"))
                .with_display_name(if i % 8 == 0 { format!("Demo{i}") } else { String::new() })
                .with_byte_size((i * 2654435761) % 65536)
        })
        .collect();
    CollectionDescriptor::new(entries)
}

#[derive(Debug, Default)]
pub struct Summary {
    pub frames: u64,
    pub tasks_ran: usize,
    pub tasks_failed: usize,
    pub phase_runs: usize,
    pub preload_finished_at: Option<u64>,
}

pub struct World {
    clock: PriorityClock,
    frame: Duration,
    scheduler: Arc<IntervalScheduler>,
    executor: PhaseExecutor,
    manager: MemoryResourceManager,
    collection: Arc<CollectionResource>,
    bodies: Arc<Bodies>,
    resources_per_frame: usize,
    register_names: bool,
}

impl World {
    pub fn new(settings: &Settings, collection_path: Option<&Path>) -> Result<Self> {
        let executor = match settings.phases.worker_threads {
            0 => PhaseExecutor::new(),
            threads => PhaseExecutor::with_worker_threads(threads)
                .context("building the parallel phase thread pool")?,
        };
        let scheduler = Arc::new(IntervalScheduler::with_budget(settings.scheduler.budget()));

        let manager = MemoryResourceManager::new();
        let kinds = ResourceKindRegistry::new();
        for asset_type in ASSET_TYPES {
            kinds.register(manager.kind(asset_type));
        }
        let services = AssetServices::new(
            Arc::new(kinds),
            Arc::new(manager.clone()),
            Arc::new(NameRegistry::new()),
        );

        let descriptor = match collection_path {
            Some(path) => load_descriptor(path)
                .with_context(|| format!("reading collection {}", path.display()))?,
            None => demo_descriptor(),
        };
        tracing::info!(entries = descriptor.len(), "collection ready");
        let collection = Arc::new(CollectionResource::from_descriptor(services, descriptor));

        let resources_per_frame = settings.preload.resources_per_frame.max(1);
        schedule_incremental_preload(&scheduler, &collection, resources_per_frame, Duration::ZERO)?;

        let bodies = Arc::new(Bodies::new(settings.phases.component_count));
        register_update_functions(&executor, &bodies)?;
        register_tasks(&scheduler, &bodies, &collection)?;

        Ok(Self {
            clock: settings.scheduler.clock(),
            frame: settings.scheduler.frame_duration(),
            scheduler,
            executor,
            manager,
            collection,
            bodies,
            resources_per_frame,
            register_names: settings.preload.register_names,
        })
    }

    pub fn run(mut self, frames: u64) -> Summary {
        let mut summary = Summary::default();
        let range = 0..self.bodies.len();

        for frame in 0..frames {
            let now = self.clock.advance(self.frame);
            let tick = self.scheduler.run_due_tasks(now, true);
            summary.tasks_ran += tick.ran;
            summary.tasks_failed += tick.failed;

            for report in self.executor.run_all_phases(true, range.clone()) {
                summary.phase_runs += report.ran;
            }

            self.manager.pump(self.resources_per_frame);
            if summary.preload_finished_at.is_none() && self.collection.is_loading_finished() {
                summary.preload_finished_at = Some(frame);
                if self.register_names {
                    self.collection.register_names();
                }
                tracing::info!(frame, "collection preload finished");
            }
            summary.frames += 1;
        }

        tracing::debug!(
            input_frames = self.bodies.input_frames.load(Ordering::Relaxed),
            bounces = self.bodies.bounces.load(Ordering::Relaxed),
            resident_bytes = self.collection.memory_usage(),
            "shutting down"
        );
        self.scheduler.clear();
        self.collection.unload();
        summary
    }
}
