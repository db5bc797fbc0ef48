use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::{Tracer, TracerHandle};

/// Tracer for tests.
///
/// Output goes through the test harness writer, so it is only shown for failing tests. The
/// filter is read from `RUST_LOG` and defaults to `warn`. Installing it twice is not an error.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TestTracer;

impl Tracer for TestTracer {
    fn init(self) -> eyre::Result<TracerHandle> {
        let filter =
            EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy();
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
        Ok(TracerHandle::default())
    }
}
