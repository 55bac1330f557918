use crate::client::EditorClient;
use crate::config::Config;
use crate::file_consumer::FileConsumerSharedState;
use crate::import_manager::ImportManager;
use crate::indexer::{FileContents, Indexer};
use crate::messages::{
    IndexDoIdMap, IndexOnIdMapped, IndexOnIndexed, IndexRequest, MappedIndex,
    PerformanceImportFile,
};
use crate::queue::{MultiQueueWaiter, ThreadedQueue};
use crate::working_files::WorkingFiles;
use quarry_cache::{now_millis, IndexCache, TimestampManager};
use quarry_db::{IdMap, IndexUpdate, QueryDatabase};
use quarry_index::IndexFile;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The five pipeline queues plus the waiters that block idle workers.
///
/// One instance is threaded through everything at startup; tests build their
/// own per fixture.
pub struct PipelineQueues {
    pub indexer_waiter: Arc<MultiQueueWaiter>,
    pub querydb_waiter: Arc<MultiQueueWaiter>,

    pub index_request: ThreadedQueue<IndexRequest>,
    pub do_id_map: ThreadedQueue<IndexDoIdMap>,
    pub load_previous_index: ThreadedQueue<IndexDoIdMap>,
    pub on_id_mapped: ThreadedQueue<IndexOnIdMapped>,
    pub on_indexed: ThreadedQueue<IndexOnIndexed>,
}

impl PipelineQueues {
    pub fn new() -> Self {
        let indexer_waiter = MultiQueueWaiter::new();
        let querydb_waiter = MultiQueueWaiter::new();
        Self {
            index_request: ThreadedQueue::new(vec![indexer_waiter.clone()]),
            do_id_map: ThreadedQueue::new(vec![querydb_waiter.clone()]),
            load_previous_index: ThreadedQueue::new(vec![indexer_waiter.clone()]),
            on_id_mapped: ThreadedQueue::new(vec![indexer_waiter.clone()]),
            // Consumed by both pools: indexer workers merge, the query-db
            // worker applies.
            on_indexed: ThreadedQueue::new(vec![indexer_waiter.clone(), querydb_waiter.clone()]),
            indexer_waiter,
            querydb_waiter,
        }
    }
}

impl Default for PipelineQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide pipeline counters.
#[derive(Debug, Default)]
pub struct ImportPipelineStatus {
    pub num_active_threads: AtomicI64,
    /// Wall-clock millisecond at which the next idle progress report may be
    /// emitted.
    pub next_progress_output: AtomicI64,
}

/// Everything the pipeline stages share.
pub struct PipelineContext {
    pub config: Config,
    pub queues: PipelineQueues,
    pub file_consumer_shared: FileConsumerSharedState,
    pub timestamps: TimestampManager,
    pub import_manager: ImportManager,
    pub status: ImportPipelineStatus,
    pub working_files: WorkingFiles,
    pub client: Arc<dyn EditorClient>,
}

impl PipelineContext {
    pub fn new(config: Config, client: Arc<dyn EditorClient>) -> Self {
        Self {
            config,
            queues: PipelineQueues::new(),
            file_consumer_shared: FileConsumerSharedState::new(),
            timestamps: TimestampManager::new(),
            import_manager: ImportManager::new(),
            status: ImportPipelineStatus::default(),
            working_files: WorkingFiles::new(),
            client,
        }
    }

    pub fn progress_status(&self) -> crate::client::ProgressStatus {
        crate::client::ProgressStatus {
            index_request_count: self.queues.index_request.len(),
            do_id_map_count: self.queues.do_id_map.len(),
            load_previous_index_count: self.queues.load_previous_index.len(),
            on_id_mapped_count: self.queues.on_id_mapped.len(),
            on_indexed_count: self.queues.on_indexed.len(),
            active_threads: self.status.num_active_threads.load(Ordering::Relaxed),
        }
    }
}

/// Scoped "this worker is busy" marker; emits a progress report on exit when
/// reporting is enabled.
struct ActiveThread<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> ActiveThread<'a> {
    fn new(ctx: &'a PipelineContext) -> Self {
        if ctx.config.progress_report_frequency_ms >= 0 {
            ctx.status.num_active_threads.fetch_add(1, Ordering::Relaxed);
        }
        Self { ctx }
    }
}

impl Drop for ActiveThread<'_> {
    fn drop(&mut self) {
        let frequency = self.ctx.config.progress_report_frequency_ms;
        if frequency < 0 {
            return;
        }
        self.ctx
            .status
            .num_active_threads
            .fetch_sub(1, Ordering::Relaxed);
        emit_progress(self.ctx);
    }
}

fn emit_progress(ctx: &PipelineContext) {
    let frequency = ctx.config.progress_report_frequency_ms;
    let status = ctx.progress_status();

    if frequency > 0 {
        // Busy pipelines report every pass; idle ones are rate-limited so a
        // quiet server does not spam its client.
        let now = now_millis();
        if status.is_idle() && now < ctx.status.next_progress_output.load(Ordering::Relaxed) {
            return;
        }
        ctx.status
            .next_progress_output
            .store(now + frequency, Ordering::Relaxed);
    }

    ctx.client.publish_progress(status);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileParseQuery {
    NeedsParse,
    DoesNotNeedParse,
    NoSuchFile,
}

/// Decides whether `path` must be reparsed, updating cached state as a side
/// effect: a stale path loses its claim in the file-consumer set, and a
/// fresh dependency claim is recorded in the import manager.
fn file_needs_parse(
    ctx: &PipelineContext,
    cache: &IndexCache,
    is_interactive: bool,
    path: &str,
    is_dependency: bool,
) -> FileParseQuery {
    // If the file is a dependency but another parse already imported it,
    // don't bother.
    if !is_interactive
        && is_dependency
        && !ctx.import_manager.try_mark_dependency_imported(path)
    {
        return FileParseQuery::DoesNotNeedParse;
    }

    let Some(modification_time) = quarry_core::fs::last_modification_time(path) else {
        return FileParseQuery::NoSuchFile;
    };

    let last_cached = ctx.timestamps.get_last_cached_modification_time(cache, path);
    match last_cached {
        Some(cached) if cached == modification_time => FileParseQuery::DoesNotNeedParse,
        _ => {
            ctx.file_consumer_shared.reset(path);
            FileParseQuery::NeedsParse
        }
    }
}

fn do_parse_file(
    ctx: &PipelineContext,
    cache: &IndexCache,
    indexer: &dyn Indexer,
    is_interactive: bool,
    path: &str,
    args: &[String],
    contents: &FileContents,
) -> Vec<IndexDoIdMap> {
    let mut result = Vec::new();

    // Run this block even for interactive requests: the dependency walk
    // updates the claim set either way.
    let previous_dependencies = cache.try_load(path).map(|prev| prev.dependencies.clone());
    if let Some(dependencies) = &previous_dependencies {
        let path_state = file_needs_parse(ctx, cache, is_interactive, path, false);

        // Target file does not exist on disk; emit nothing.
        if path_state == FileParseQuery::NoSuchFile {
            return result;
        }

        let mut needs_reparse = is_interactive || path_state == FileParseQuery::NeedsParse;

        for dependency in dependencies {
            // `!=` rather than `== NeedsParse`: a missing dependency must
            // force a reparse too.
            if file_needs_parse(ctx, cache, is_interactive, dependency, true)
                != FileParseQuery::DoesNotNeedParse
            {
                tracing::info!(
                    target = "quarry.pipeline",
                    dependency = %dependency,
                    via = %path,
                    "timestamp changed"
                );
                needs_reparse = true;
                // Keep walking: the claim set is updated inside
                // `file_needs_parse` for every dependency.
            }
        }

        // No timestamp changed; serve everything from cache.
        if !needs_reparse {
            tracing::info!(target = "quarry.pipeline", path = %path, "skipping parse; no timestamp change");

            let mut perf = PerformanceImportFile::default();
            let load_timer = Instant::now();
            let primary = cache.take_or_load(path);
            perf.index_load_cached = load_timer.elapsed().as_micros() as u64;
            result.push(IndexDoIdMap::new(primary, perf, is_interactive, false));

            for dependency in dependencies {
                // Only load a dependency the first time anyone claims it; in
                // large projects most headers are shared by many sources.
                if !ctx.file_consumer_shared.mark(dependency) {
                    continue;
                }

                // May be absent when there is no cache for it but another
                // file already started importing it.
                let Some(dependency_index) = cache.try_take_or_load(dependency) else {
                    continue;
                };

                tracing::info!(
                    target = "quarry.pipeline",
                    path = %dependency,
                    via = %path,
                    "emitting index result"
                );
                result.push(IndexDoIdMap::new(
                    dependency_index,
                    perf,
                    is_interactive,
                    false,
                ));
            }
            return result;
        }
    }

    tracing::info!(target = "quarry.pipeline", path = %path, "parsing");

    // Capture contents for everything the parse may touch before invoking
    // the analyzer, to minimize the race between indexing a file and editing
    // it. If the dependency set changed we may preload too much or too
    // little; the analyzer reads anything missing on its own.
    let mut loaded_primary = contents.path == path;
    let mut file_contents = vec![contents.clone()];
    cache.iterate_loaded(|index| {
        let Some(content) = quarry_core::fs::read_content(&index.path) else {
            tracing::error!(target = "quarry.pipeline", path = %index.path, "failed to load index content");
            return;
        };
        loaded_primary = loaded_primary || index.path == path;
        file_contents.push(FileContents::new(index.path.clone(), content));
    });
    if !loaded_primary {
        let Some(content) = quarry_core::fs::read_content(path) else {
            tracing::error!(target = "quarry.pipeline", path = %path, "skipping index; file cannot be found");
            return result;
        };
        file_contents.push(FileContents::new(path, content));
    }

    let mut perf = PerformanceImportFile::default();
    let indexes = indexer.index(path, args, &file_contents, &mut perf);
    for new_index in indexes {
        // Only emit diagnostics for non-interactive requests; interactive
        // sessions get theirs from code completion.
        if !is_interactive {
            ctx.client
                .publish_diagnostics(&new_index.path, &new_index.diagnostics);
        }

        tracing::info!(target = "quarry.pipeline", path = %new_index.path, "emitting index result");
        result.push(IndexDoIdMap::new(new_index, perf, is_interactive, true));
    }

    result
}

fn parse_file(
    ctx: &PipelineContext,
    cache: &IndexCache,
    indexer: &dyn Indexer,
    request: &IndexRequest,
) -> Vec<IndexDoIdMap> {
    let contents = FileContents::new(request.path.clone(), request.contents.clone());

    // An index request on a header is delegated to the translation unit that
    // imports it; a header analyzed on its own produces junk.
    let tu_path = cache
        .try_load(&request.path)
        .map(|entry| entry.import_file.clone())
        .unwrap_or_else(|| request.path.clone());

    do_parse_file(
        ctx,
        cache,
        indexer,
        request.is_interactive,
        &tu_path,
        &request.args,
        &contents,
    )
}

/// Drains one `index_request`, runs the parse stage, and fans the results
/// out to `do_id_map`.
pub fn do_parse(ctx: &PipelineContext, cache: &IndexCache, indexer: &dyn Indexer) -> bool {
    let Some(request) = ctx.queues.index_request.try_pop() else {
        return false;
    };

    let responses = parse_file(ctx, cache, indexer, &request);
    if responses.is_empty() {
        return false;
    }

    ctx.queues.do_id_map.push_all(responses);
    true
}

/// Drains one `on_id_mapped`, computes the delta update, persists the index
/// when requested, and forwards to `on_indexed`.
pub fn do_create_index_update(ctx: &PipelineContext, cache: &IndexCache) -> bool {
    let Some(mut response) = ctx.queues.on_id_mapped.try_pop() else {
        return false;
    };

    let timer = Instant::now();
    let (previous_ids, previous_file) = match &response.previous {
        Some(previous) => (Some(&previous.ids), Some(&previous.file)),
        None => (None, None),
    };
    let update = IndexUpdate::create_delta(
        previous_ids,
        &response.current.ids,
        previous_file,
        &response.current.file,
    );
    response.perf.index_make_delta = timer.elapsed().as_micros() as u64;
    tracing::info!(
        target = "quarry.pipeline",
        path = %response.current.file.path,
        is_delta = response.previous.is_some(),
        "built index update"
    );

    if response.write_to_disk {
        let timer = Instant::now();
        let path = response.current.file.path.clone();
        let modification_time = response.current.file.last_modification_time;
        match cache.write_to_cache(&mut response.current.file) {
            Ok(()) => {
                response.perf.index_save_to_disk = timer.elapsed().as_micros() as u64;
                ctx.timestamps
                    .update_cached_modification_time(&path, modification_time);
            }
            Err(err) => {
                tracing::error!(
                    target = "quarry.pipeline",
                    path = %path,
                    error = %err,
                    "failed to write cached index"
                );
            }
        }
    }

    ctx.queues.on_indexed.push(IndexOnIndexed {
        update,
        perf: response.perf,
    });
    true
}

/// Drains one `load_previous_index`, attaching the prior cached version, and
/// sends the request back through `do_id_map`.
pub fn load_previous_index(ctx: &PipelineContext, cache: &IndexCache) -> bool {
    let Some(mut response) = ctx.queues.load_previous_index.try_pop() else {
        return false;
    };

    response.previous = cache.try_take_or_load(&response.current.path);
    if response.previous.is_none() {
        tracing::error!(
            target = "quarry.pipeline",
            path = %response.current.path,
            "unable to load previous index for already imported index"
        );
    }

    ctx.queues.do_id_map.push(response);
    true
}

/// Opportunistically collapses pending `on_indexed` updates into one, so the
/// query-db worker applies fewer, bigger updates.
pub fn merge_index_updates(ctx: &PipelineContext) -> bool {
    let Some(mut root) = ctx.queues.on_indexed.try_pop() else {
        return false;
    };

    let mut did_merge = false;
    while let Some(to_join) = ctx.queues.on_indexed.try_pop() {
        did_merge = true;
        root.update.merge(to_join.update);
    }

    ctx.queues.on_indexed.push(root);
    did_merge
}

/// One pass of the indexer worker body. Returns whether any stage did work.
pub fn indexer_pump(ctx: &PipelineContext, cache: &IndexCache, indexer: &dyn Indexer) -> bool {
    let _active = ActiveThread::new(ctx);
    let mut did_work = false;

    // Run every stage each pass so neither parsing nor delta building can
    // starve the query-db worker; it also lets clients query the partially
    // constructed index.
    did_work = do_parse(ctx, cache, indexer) || did_work;
    did_work = do_create_index_update(ctx, cache) || did_work;
    did_work = load_previous_index(ctx, cache) || did_work;

    // Nothing to parse and no updates to create; spend the idle pass joining
    // already-created updates to reduce work on the query-db worker.
    if !did_work {
        did_work = merge_index_updates(ctx);
    }

    did_work
}

/// Indexer worker loop; runs until process exit.
pub fn indexer_main(ctx: &PipelineContext, indexer: &dyn Indexer) -> ! {
    let cache = IndexCache::new(&ctx.config.cache_directory, ctx.config.cache_format);
    loop {
        let did_work = indexer_pump(ctx, &cache, indexer);
        if !did_work {
            let queues = &ctx.queues;
            ctx.queues.indexer_waiter.wait(&[
                &queues.on_indexed,
                &queues.index_request,
                &queues.on_id_mapped,
                &queues.load_previous_index,
            ]);
        }
    }
}

/// One pass of the query-db worker: the id-map stage followed by the apply
/// stage. Returns whether any work was done.
pub fn querydb_import_pump(
    ctx: &PipelineContext,
    db: &mut QueryDatabase,
    cache: &IndexCache,
) -> bool {
    let _active = ActiveThread::new(ctx);
    let mut did_work = false;

    while let Some(mut request) = ctx.queues.do_id_map.try_pop() {
        did_work = true;

        // The file was imported before, but this request carries no previous
        // state: reload the prior version from cache and rerun later. Only
        // attempted once per request. This must happen before the import
        // gate, or the id maps would never be generated.
        if !request.load_previous
            && request.previous.is_none()
            && db.contains_file(&request.current.path)
        {
            request.load_previous = true;
            ctx.queues.load_previous_index.push(request);
            continue;
        }

        // At most one import per path may be in flight past this point.
        if !ctx.import_manager.start_querydb_import(&request.current.path) {
            tracing::info!(
                target = "quarry.pipeline",
                path = %request.current.path,
                "dropping index; already being imported"
            );
            continue;
        }

        let timer = Instant::now();
        let current_ids = IdMap::new(db, &request.current.id_cache);
        let previous = request.previous.take().map(|file| {
            let ids = IdMap::new(db, &file.id_cache);
            MappedIndex { file, ids }
        });
        let mut perf = request.perf;
        perf.querydb_id_map = timer.elapsed().as_micros() as u64;

        ctx.queues.on_id_mapped.push(IndexOnIdMapped {
            current: MappedIndex {
                file: request.current,
                ids: current_ids,
            },
            previous,
            perf,
            is_interactive: request.is_interactive,
            write_to_disk: request.write_to_disk,
        });
    }

    while let Some(response) = ctx.queues.on_indexed.try_pop() {
        did_work = true;
        apply_update_to_db(ctx, db, cache, &response.update);
    }

    did_work
}

fn apply_update_to_db(
    ctx: &PipelineContext,
    db: &mut QueryDatabase,
    cache: &IndexCache,
    update: &IndexUpdate,
) {
    for file_def in &update.files_def_update {
        let open = ctx
            .working_files
            .with_file(&file_def.path, |working_file| {
                // The marker line-mapping must see the content the index was
                // built from; prefer the cache's snapshot, fall back to the
                // live buffer.
                let content = cache
                    .load_cached_file_contents(&file_def.path)
                    .unwrap_or_else(|| working_file.buffer_content.clone());
                working_file.set_index_content(content);
            })
            .is_some();

        if open {
            ctx.client
                .publish_inactive_regions(&file_def.path, &file_def.inactive_regions);
        }
    }

    db.apply_index_update(update);
    tracing::info!(
        target = "quarry.pipeline",
        files = ?update
            .files_def_update
            .iter()
            .map(|def| def.path.as_str())
            .collect::<Vec<_>>(),
        "applied index update"
    );

    for file_def in &update.files_def_update {
        if ctx.working_files.is_open(&file_def.path) {
            ctx.client.refresh_semantic_highlighting(&file_def.path);
        }
    }

    // Release the gates only after the update is visible in the database.
    for file_def in &update.files_def_update {
        ctx.import_manager.done_querydb_import(&file_def.path);
    }
}

/// Query-db worker loop; runs until process exit.
pub fn querydb_main(ctx: &PipelineContext, mut db: QueryDatabase) -> ! {
    let cache = IndexCache::new(&ctx.config.cache_directory, ctx.config.cache_format);
    loop {
        let did_work = querydb_import_pump(ctx, &mut db, &cache);
        if !did_work {
            let queues = &ctx.queues;
            ctx.queues
                .querydb_waiter
                .wait(&[&queues.do_id_map, &queues.on_indexed]);
        }
    }
}

/// Admits indexes produced by an already-completed interactive parse (e.g.
/// from code completion), bypassing the parse stage.
pub fn index_with_live_parse(ctx: &PipelineContext, path: &str, indexes: Vec<IndexFile>) {
    ctx.file_consumer_shared.reset(path);

    let perf = PerformanceImportFile::default();
    let results: Vec<IndexDoIdMap> = indexes
        .into_iter()
        .map(|index| {
            tracing::info!(target = "quarry.pipeline", path = %index.path, "emitting index result");
            IndexDoIdMap::new(index, perf, true, true)
        })
        .collect();

    if results.len() > 1 {
        tracing::warn!(
            target = "quarry.pipeline",
            path = %path,
            count = results.len(),
            "live reindex produced more than one index"
        );
    }

    ctx.queues.do_id_map.push_all(results);
}

/// Spawns the indexer worker pool. Thread creation can fail in constrained
/// CI/sandbox environments; the pool degrades to however many workers could
/// be spawned rather than crashing, as long as there is at least one.
pub fn spawn_indexer_pool<F>(ctx: &Arc<PipelineContext>, make_indexer: F)
where
    F: Fn() -> Box<dyn Indexer>,
{
    let requested = ctx.config.indexer_count.max(1);
    for i in 0..requested {
        let ctx = ctx.clone();
        let indexer = make_indexer();
        let spawned = std::thread::Builder::new()
            .name(format!("quarry-index-{i}"))
            .spawn(move || indexer_main(&ctx, indexer.as_ref()));
        match spawned {
            Ok(_detached) => {}
            Err(err) if i > 0 => {
                tracing::warn!(
                    target = "quarry.pipeline",
                    error = %err,
                    workers = i,
                    "failed to spawn indexer worker; continuing with a smaller pool"
                );
                return;
            }
            Err(err) => panic!("failed to spawn indexer worker (requested {requested}): {err}"),
        }
    }
}

/// Spawns the single query-db worker that owns `db`.
pub fn spawn_querydb_worker(ctx: &Arc<PipelineContext>, db: QueryDatabase) {
    let ctx = ctx.clone();
    if let Err(err) = std::thread::Builder::new()
        .name("quarry-querydb".to_string())
        .spawn(move || querydb_main(&ctx, db))
    {
        panic!("failed to spawn query-db worker: {err}");
    }
}
