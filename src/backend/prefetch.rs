use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};

use super::images::{ImageLoadError, load_image};

/// Identifies one prefetch job so results can be routed back to the view
/// that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Ticket(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub enum PrefetchEvent {
    Loaded {
        ticket: Ticket,
        index: usize,
        image: DynamicImage,
    },
    Failed {
        ticket: Ticket,
        index: usize,
        error: ImageLoadError,
    },
}

/// Owned by the view that started the job. Dropping it stops the job before
/// its next image.
#[derive(Debug)]
pub struct PrefetchHandle {
    ticket: Ticket,
    demand: watch::Sender<usize>,
}

impl PrefetchHandle {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Lets the job load up to `count` items. The demand never shrinks.
    pub fn demand(&self, count: usize) {
        self.demand.send_if_modified(|wanted| {
            if count > *wanted {
                *wanted = count;
                true
            } else {
                false
            }
        });
    }
}

type Loader = fn(&Path) -> Result<DynamicImage, ImageLoadError>;

/// Decodes `paths` in order on the blocking pool, loading item `i` only once
/// the demand exceeds `i`. Stops at the first failure.
pub fn spawn_prefetch(
    paths: Vec<PathBuf>,
    demand: usize,
    tx: mpsc::UnboundedSender<PrefetchEvent>,
) -> PrefetchHandle {
    spawn_with_loader(paths, demand, tx, load_image)
}

fn spawn_with_loader(
    paths: Vec<PathBuf>,
    demand: usize,
    tx: mpsc::UnboundedSender<PrefetchEvent>,
    loader: Loader,
) -> PrefetchHandle {
    let ticket = Ticket::next();
    let (demand_tx, demand_rx) = watch::channel(demand);

    log::debug!("Prefetch {:?} started for {} images", ticket, paths.len());
    tokio::spawn(run_prefetch(ticket, paths, demand_rx, tx, loader));

    PrefetchHandle {
        ticket,
        demand: demand_tx,
    }
}

async fn run_prefetch(
    ticket: Ticket,
    paths: Vec<PathBuf>,
    mut demand: watch::Receiver<usize>,
    tx: mpsc::UnboundedSender<PrefetchEvent>,
    loader: Loader,
) {
    for (index, path) in paths.into_iter().enumerate() {
        if demand.has_changed().is_err() || demand.wait_for(|wanted| index < *wanted).await.is_err() {
            log::debug!("Prefetch {:?} cancelled before image {}", ticket, index);
            return;
        }

        let job_path = path.clone();
        let event = match tokio::task::spawn_blocking(move || loader(&job_path)).await {
            Ok(Ok(image)) => PrefetchEvent::Loaded { ticket, index, image },
            Ok(Err(error)) => PrefetchEvent::Failed { ticket, index, error },
            Err(e) => {
                log::error!("Prefetch {:?} decoder task died: {}", ticket, e);
                let error = ImageLoadError::Panicked { path, message: e.to_string() };
                PrefetchEvent::Failed { ticket, index, error }
            }
        };

        let failed = matches!(event, PrefetchEvent::Failed { .. });
        if tx.send(event).is_err() || failed {
            return;
        }
    }
    log::debug!("Prefetch {:?} finished", ticket);
}
