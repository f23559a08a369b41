//! The log engine: queue pair, dedicated writer thread, and dispatch.
//!
//! ## Threading model
//!
//! - Producers (typically the network event loop) submit records through a
//!   cloneable [`SubmitHandle`]; submission never blocks.
//! - One dedicated worker thread drains the inbound queue, appends mutation
//!   lines to the current segment, batches the flush, and executes checkpoint
//!   requests inline. No other thread writes the segment, the checkpoint
//!   files, or the latest alias.
//! - The host event loop calls [`LogEngine::dispatch`] on its periodic tick
//!   to deliver completion notifications in its own context. A record reaches
//!   dispatch only after the flush that covered its bytes.
//!
//! The engine is an explicitly constructed object owned by the server's
//! composition root; there is no process-wide instance.
//!
//! ## Failure posture
//!
//! Append and flush failures mean mutations can no longer be durably
//! recorded: the worker stores the error in a fatal slot, logs it, and exits.
//! [`LogEngine::shutdown`] surfaces the stored error. Checkpoint-file
//! failures are *not* fatal; the attempt is abandoned and reported to the
//! requester while logging continues (durability lags, state stays safe).

use crate::checkpoint::CheckpointWriter;
use crate::error::{DurabilityError, DurabilityResult};
use crate::format::DEFAULT_GENERATION;
use crate::record::{
    CheckpointReceipt, CheckpointRecord, CheckpointResponder, LogRequest, OpRecord,
};
use crate::segment::SegmentWriter;
use crate::storage::Directory;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Construction options for [`LogEngine`].
#[derive(Debug, Clone)]
pub struct LogEngineOptions {
    /// Generation of the segment to open for append; recovery hands the
    /// replay generation here so new mutations continue the same segment.
    pub start_generation: u64,
    /// Issue `sync_all` as part of every batch flush. Off by default:
    /// `flush()` is the visibility boundary, stable-storage sync is opt-in.
    pub sync_on_flush: bool,
}

impl Default for LogEngineOptions {
    fn default() -> Self {
        Self {
            start_generation: DEFAULT_GENERATION,
            sync_on_flush: false,
        }
    }
}

/// Cloneable producer-side handle for submitting records.
#[derive(Clone)]
pub struct SubmitHandle {
    tx: Sender<LogRequest>,
}

impl SubmitHandle {
    /// Queue a mutation for logging. Never blocks.
    pub fn submit(&self, record: OpRecord) -> DurabilityResult<()> {
        self.tx
            .send(LogRequest::Op(record))
            .map_err(|_| DurabilityError::WorkerClosed)
    }

    /// Queue a checkpoint request carrying a pre-serialized snapshot body.
    ///
    /// The outcome of the attempt is reported to `responder` if one is given;
    /// abandoned attempts arrive as `Err(CheckpointAbandoned)`.
    pub fn request_checkpoint(
        &self,
        snapshot: String,
        responder: Option<CheckpointResponder>,
    ) -> DurabilityResult<()> {
        self.tx
            .send(LogRequest::Checkpoint(CheckpointRecord {
                snapshot,
                responder,
            }))
            .map_err(|_| DurabilityError::WorkerClosed)
    }
}

/// Metadata durability engine for one chunk server.
#[derive(Debug)]
pub struct LogEngine {
    tx: Option<Sender<LogRequest>>,
    completed: Receiver<OpRecord>,
    worker: Option<JoinHandle<()>>,
    fatal: Arc<Mutex<Option<DurabilityError>>>,
}

impl LogEngine {
    /// Open the segment for `options.start_generation` and start the worker.
    ///
    /// Fails fast if the segment cannot be opened for append.
    pub fn start(dir: Arc<dyn Directory>, options: LogEngineOptions) -> DurabilityResult<Self> {
        let segment =
            SegmentWriter::open(dir.clone(), options.start_generation, options.sync_on_flush)?;
        let checkpoints = CheckpointWriter::new(dir);

        let (tx, inbound) = mpsc::channel();
        let (outbound, completed) = mpsc::channel();
        let fatal = Arc::new(Mutex::new(None));
        let worker_fatal = fatal.clone();

        let worker = thread::Builder::new()
            .name("chunklog-writer".into())
            .spawn(move || worker_loop(segment, checkpoints, inbound, outbound, worker_fatal))?;

        Ok(Self {
            tx: Some(tx),
            completed,
            worker: Some(worker),
            fatal,
        })
    }

    fn sender(&self) -> &Sender<LogRequest> {
        self.tx
            .as_ref()
            .expect("sender present until shutdown/drop")
    }

    /// Producer-side handle; clone freely across threads.
    pub fn handle(&self) -> SubmitHandle {
        SubmitHandle {
            tx: self.sender().clone(),
        }
    }

    /// Queue a mutation for logging. Never blocks.
    pub fn submit(&self, record: OpRecord) -> DurabilityResult<()> {
        self.sender()
            .send(LogRequest::Op(record))
            .map_err(|_| DurabilityError::WorkerClosed)
    }

    /// Queue a checkpoint request; see [`SubmitHandle::request_checkpoint`].
    pub fn request_checkpoint(
        &self,
        snapshot: String,
        responder: Option<CheckpointResponder>,
    ) -> DurabilityResult<()> {
        self.sender()
            .send(LogRequest::Checkpoint(CheckpointRecord {
                snapshot,
                responder,
            }))
            .map_err(|_| DurabilityError::WorkerClosed)
    }

    /// Request a checkpoint and block until the attempt resolves.
    pub fn checkpoint(&self, snapshot: String) -> DurabilityResult<CheckpointReceipt> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.request_checkpoint(snapshot, Some(tx))?;
        match rx.recv() {
            Ok(result) => result,
            Err(_) => Err(DurabilityError::WorkerClosed),
        }
    }

    /// Drain completed records and invoke their requesters' notifications.
    ///
    /// Intended to be called from the host event loop's periodic tick.
    /// Returns the number of completions delivered.
    pub fn dispatch(&self) -> usize {
        let mut delivered = 0;
        while let Ok(record) = self.completed.try_recv() {
            if let Some(requester) = &record.requester {
                requester.op_logged(&record.op);
            }
            delivered += 1;
        }
        delivered
    }

    /// Whether the worker hit a fatal durability failure.
    pub fn has_failed(&self) -> bool {
        self.fatal.lock().map(|slot| slot.is_some()).unwrap_or(true)
    }

    /// Stop accepting work, let the worker finish queued requests, and join it.
    ///
    /// Returns the fatal error if the worker stopped on one.
    pub fn shutdown(mut self) -> DurabilityResult<()> {
        if let Some(tx) = self.tx.take() {
            // Outstanding SubmitHandle clones keep the channel connected, so
            // stopping is an explicit queued request, not a disconnect.
            let _ = tx.send(LogRequest::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let mut slot = self
            .fatal
            .lock()
            .map_err(|_| DurabilityError::LockFailed {
                resource: "engine fatal slot".to_string(),
                reason: "lock poisoned".to_string(),
            })?;
        match slot.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for LogEngine {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(LogRequest::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn record_fatal(fatal: &Mutex<Option<DurabilityError>>, e: DurabilityError) {
    error!(error = %e, "log worker cannot durably record mutations; stopping");
    if let Ok(mut slot) = fatal.lock() {
        slot.get_or_insert(e);
    }
}

fn worker_loop(
    mut segment: SegmentWriter,
    checkpoints: CheckpointWriter,
    inbound: Receiver<LogRequest>,
    outbound: Sender<OpRecord>,
    fatal: Arc<Mutex<Option<DurabilityError>>>,
) {
    let mut done: Vec<OpRecord> = Vec::new();
    let mut shutting_down = false;
    loop {
        // Block for the first request, then drain whatever else is ready.
        let Ok(first) = inbound.recv() else {
            return;
        };
        let mut next = Some(first);
        while let Some(request) = next {
            match request {
                LogRequest::Op(record) => {
                    if let Err(e) = segment.append_op(&record.op) {
                        record_fatal(&fatal, e);
                        return;
                    }
                    done.push(record);
                }
                LogRequest::Checkpoint(record) => {
                    // Everything appended so far must be on disk before the
                    // snapshot claims to cover it.
                    if let Err(e) = segment.flush() {
                        record_fatal(&fatal, e);
                        return;
                    }
                    if !run_checkpoint(&mut segment, &checkpoints, record, &fatal) {
                        return;
                    }
                }
                LogRequest::Shutdown => {
                    shutting_down = true;
                    break;
                }
            }
            next = inbound.try_recv().ok();
        }

        // One flush covers the whole drained batch; only then do the batched
        // records become dispatchable.
        if let Err(e) = segment.flush() {
            record_fatal(&fatal, e);
            return;
        }
        for record in done.drain(..) {
            if outbound.send(record).is_err() {
                return;
            }
        }
        if shutting_down {
            return;
        }
    }
}

/// Returns `false` if the worker must stop (continuation segment unopenable).
fn run_checkpoint(
    segment: &mut SegmentWriter,
    checkpoints: &CheckpointWriter,
    record: CheckpointRecord,
    fatal: &Mutex<Option<DurabilityError>>,
) -> bool {
    match checkpoints.write_and_publish(segment.generation(), &record.snapshot) {
        Ok(receipt) => match segment.rotate() {
            Ok(log_generation) => {
                debug!(
                    checkpoint = %receipt.checkpoint_path,
                    log_generation,
                    "checkpoint published, log rotated"
                );
                if let Some(responder) = record.responder {
                    let _ = responder.send(Ok(receipt));
                }
                true
            }
            Err(e) => {
                // The checkpoint itself is durable; answer the requester
                // before stopping on the rotation failure.
                if let Some(responder) = record.responder {
                    let _ = responder.send(Ok(receipt));
                }
                record_fatal(fatal, e);
                false
            }
        },
        Err(e) => {
            warn!(error = %e, "checkpoint attempt abandoned; logging continues");
            if let Some(responder) = record.responder {
                let _ = responder.send(Err(e));
            }
            true
        }
    }
}
