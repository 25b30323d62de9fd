//! Ordered extraction tiers with per-call timeouts.

use super::{ExifExtractor, HeaderExtractor, MetadataExtractor, PhotoMetadata};
use crate::core::scanner::PhotoFormat;
use crate::error::ExtractError;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A tier that failed for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractFailure {
    pub extractor: &'static str,
    pub error: ExtractError,
}

/// Outcome of running the chain on one file. Always carries a record.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Possibly empty
    pub metadata: PhotoMetadata,
    /// Name of the tier that produced `metadata`
    pub source: Option<&'static str>,
    /// Tiers tried before `source`, or all of them when `source` is `None`
    pub failures: Vec<ExtractFailure>,
}

impl Extraction {
    /// True when every tier failed and the body is empty
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    /// True when the rich tier failed and a later tier was used
    pub fn used_fallback(&self) -> bool {
        self.source.is_some() && !self.failures.is_empty()
    }
}

/// Timed-out helper threads allowed to linger before tiers are skipped
pub const DEFAULT_STALLED_LIMIT: usize = 32;

/// Tries extractors in order until one yields data
#[derive(Clone)]
pub struct ExtractorChain {
    extractors: Vec<Arc<dyn MetadataExtractor>>,
    timeout: Option<Duration>,
    stalled_limit: usize,
    /// Helpers that timed out and have not returned yet, shared by clones
    stalled: Arc<AtomicUsize>,
}

impl ExtractorChain {
    /// An empty chain; every file gets an empty record
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            timeout: None,
            stalled_limit: DEFAULT_STALLED_LIMIT,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// EXIF first, then the header fallback
    pub fn standard() -> Self {
        Self::new()
            .with(ExifExtractor::new())
            .with(HeaderExtractor::new())
    }

    /// Append a tier
    pub fn with(mut self, extractor: impl MetadataExtractor + 'static) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    /// Bound each tier call. `None` runs tiers inline on the calling thread.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on abandoned helper threads. Once reached, timed tiers are
    /// skipped until some of them return.
    pub fn with_stalled_limit(mut self, limit: usize) -> Self {
        self.stalled_limit = limit;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Helper threads currently running past their timeout
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Run the tiers in order. Never fails.
    pub fn extract(&self, path: &Path, format: PhotoFormat) -> Extraction {
        let mut failures = Vec::new();

        for extractor in &self.extractors {
            match self.run_one(extractor, path, format) {
                Ok(metadata) => {
                    if !failures.is_empty() {
                        debug!(
                            path = %path.display(),
                            source = extractor.name(),
                            "Metadata recovered by fallback tier"
                        );
                    }
                    return Extraction {
                        metadata,
                        source: Some(extractor.name()),
                        failures,
                    };
                }
                Err(error) => {
                    debug!(
                        path = %path.display(),
                        extractor = extractor.name(),
                        error = %error,
                        "Extraction tier failed"
                    );
                    failures.push(ExtractFailure {
                        extractor: extractor.name(),
                        error,
                    });
                }
            }
        }

        Extraction {
            metadata: PhotoMetadata::default(),
            source: None,
            failures,
        }
    }

    fn run_one(
        &self,
        extractor: &Arc<dyn MetadataExtractor>,
        path: &Path,
        format: PhotoFormat,
    ) -> Result<PhotoMetadata, ExtractError> {
        match self.timeout {
            None => panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(path, format)))
                .unwrap_or_else(|_| {
                    Err(ExtractError::WorkerLost {
                        path: path.to_path_buf(),
                    })
                }),
            Some(timeout) => {
                let stalled = self.stalled();
                if stalled >= self.stalled_limit {
                    return Err(ExtractError::Saturated {
                        path: path.to_path_buf(),
                        stalled,
                    });
                }
                run_with_timeout(
                    Arc::clone(extractor),
                    path.to_path_buf(),
                    format,
                    timeout,
                    Arc::clone(&self.stalled),
                )
            }
        }
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run one tier on a helper thread and stop waiting after `timeout`.
///
/// A timed-out helper is detached and counted in `stalled` until it
/// returns; its late result is dropped with the channel.
fn run_with_timeout(
    extractor: Arc<dyn MetadataExtractor>,
    path: PathBuf,
    format: PhotoFormat,
    timeout: Duration,
    stalled: Arc<AtomicUsize>,
) -> Result<PhotoMetadata, ExtractError> {
    let (sender, receiver) = bounded(1);
    let thread_path = path.clone();
    // Set by whichever side finishes first: the helper or the timed-out waiter
    let settled = Arc::new(AtomicBool::new(false));
    let helper_settled = Arc::clone(&settled);
    let helper_stalled = Arc::clone(&stalled);

    let spawned = thread::Builder::new()
        .name(format!("extract-{}", extractor.name()))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                extractor.extract(&thread_path, format)
            }));
            if helper_settled.swap(true, Ordering::SeqCst) {
                helper_stalled.fetch_sub(1, Ordering::SeqCst);
            }
            if let Ok(result) = result {
                let _ = sender.send(result);
            }
        });

    if let Err(e) = spawned {
        warn!(path = %path.display(), error = %e, "Could not spawn extractor thread");
        return Err(ExtractError::WorkerLost { path });
    }

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            if !settled.swap(true, Ordering::SeqCst) {
                stalled.fetch_add(1, Ordering::SeqCst);
            }
            Err(ExtractError::Timeout { path, timeout })
        }
        Err(RecvTimeoutError::Disconnected) => Err(ExtractError::WorkerLost { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Option<PhotoMetadata>);

    impl MetadataExtractor for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extract(&self, path: &Path, _: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
            self.1.clone().ok_or_else(|| ExtractError::NoMetadata {
                path: path.to_path_buf(),
            })
        }
    }

    struct Slow;

    impl MetadataExtractor for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn extract(&self, _: &Path, _: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
            thread::sleep(Duration::from_secs(2));
            Ok(PhotoMetadata::default())
        }
    }

    struct Panics;

    impl MetadataExtractor for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn extract(&self, _: &Path, _: PhotoFormat) -> Result<PhotoMetadata, ExtractError> {
            panic!("decoder bug")
        }
    }

    fn with_model(model: &str) -> PhotoMetadata {
        PhotoMetadata {
            camera_model: Some(model.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn first_successful_tier_wins() {
        let chain = ExtractorChain::new()
            .with(Fixed("rich", Some(with_model("rich"))))
            .with(Fixed("lite", Some(with_model("lite"))));

        let result = chain.extract(Path::new("/a.jpg"), PhotoFormat::Jpeg);

        assert_eq!(result.source, Some("rich"));
        assert!(result.failures.is_empty());
        assert!(!result.used_fallback());
    }

    #[test]
    fn falls_back_when_rich_tier_fails() {
        let chain = ExtractorChain::new()
            .with(Fixed("rich", None))
            .with(Fixed("lite", Some(with_model("lite"))));

        let result = chain.extract(Path::new("/a.dng"), PhotoFormat::Dng);

        assert_eq!(result.source, Some("lite"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].extractor, "rich");
        assert!(result.used_fallback());
    }

    #[test]
    fn all_tiers_failing_yields_empty_record() {
        let chain = ExtractorChain::new()
            .with(Fixed("rich", None))
            .with(Fixed("lite", None));

        let result = chain.extract(Path::new("/a.dng"), PhotoFormat::Dng);

        assert!(result.is_empty());
        assert!(!result.metadata.has_data());
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn timeout_falls_through_to_next_tier() {
        let chain = ExtractorChain::new()
            .with(Slow)
            .with(Fixed("lite", Some(with_model("lite"))))
            .with_timeout(Some(Duration::from_millis(50)));

        let result = chain.extract(Path::new("/huge.nef"), PhotoFormat::Nef);

        assert_eq!(result.source, Some("lite"));
        assert!(matches!(
            result.failures[0].error,
            ExtractError::Timeout { .. }
        ));
    }

    #[test]
    fn stalled_helpers_are_capped_and_released() {
        let chain = ExtractorChain::new()
            .with(Slow)
            .with_timeout(Some(Duration::from_millis(20)))
            .with_stalled_limit(1);

        let first = chain.extract(Path::new("/a.nef"), PhotoFormat::Nef);
        assert!(matches!(first.failures[0].error, ExtractError::Timeout { .. }));
        assert_eq!(chain.stalled(), 1);

        let second = chain.extract(Path::new("/b.nef"), PhotoFormat::Nef);
        assert!(matches!(
            second.failures[0].error,
            ExtractError::Saturated { stalled: 1, .. }
        ));

        // The slow helper returns after two seconds
        thread::sleep(Duration::from_millis(2_500));
        assert_eq!(chain.stalled(), 0);
    }

    #[test]
    fn panicking_tier_is_contained() {
        let inline = ExtractorChain::new()
            .with(Panics)
            .with(Fixed("lite", Some(with_model("lite"))));
        let threaded = inline.clone().with_timeout(Some(Duration::from_secs(1)));

        for chain in [inline, threaded] {
            let result = chain.extract(Path::new("/bad.jpg"), PhotoFormat::Jpeg);
            assert_eq!(result.source, Some("lite"));
            assert!(matches!(
                result.failures[0].error,
                ExtractError::WorkerLost { .. }
            ));
        }
    }

    #[test]
    fn standard_chain_order() {
        assert_eq!(ExtractorChain::standard().names(), vec!["exif", "image_header"]);
    }
}
