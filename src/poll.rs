use std::future::Future;

use crate::errors::{Error, Result};
use tokio::time::{sleep, Duration, Instant};

/// Repeats a describe call until its result satisfies a predicate.
///
/// With neither "timeout" nor "max_attempts" set, polling never gives up:
/// a resource stuck in a non-target state blocks until the process is
/// interrupted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<usize>,
}

impl Poller {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            max_attempts: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Calls "fetch" once per attempt and returns the first value for which
    /// "done" returns true. Errors from "fetch" are returned immediately.
    pub async fn until<T, F, Fut, P>(&self, mut fetch: F, mut done: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(&T) -> bool,
    {
        log::info!(
            "polling with interval {:?}, timeout {:?}, max attempts {:?}",
            self.interval,
            self.timeout,
            self.max_attempts
        );

        let start = Instant::now();
        let mut cnt: usize = 0;
        loop {
            if let Some(max) = self.max_attempts {
                if cnt >= max {
                    return Err(Error::Other {
                        message: format!("gave up polling after {} attempts", cnt),
                        retryable: true,
                    });
                }
            }
            if cnt > 0 {
                if let Some(timeout) = self.timeout {
                    if start.elapsed() + self.interval > timeout {
                        return Err(Error::Other {
                            message: format!(
                                "failed to poll in time (elapsed {:?}, timeout {:?})",
                                start.elapsed(),
                                timeout
                            ),
                            retryable: true,
                        });
                    }
                }
                sleep(self.interval).await;
            }

            let v = fetch().await?;
            cnt += 1;
            if done(&v) {
                log::info!(
                    "poll done after {} attempts (elapsed {:?})",
                    cnt,
                    start.elapsed()
                );
                return Ok(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    macro_rules! ab {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    /// RUST_LOG=debug cargo test --package ebs-manager --lib -- poll::tests::test_until_reaches_target --exact --show-output
    #[test]
    fn test_until_reaches_target() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .is_test(true)
            .try_init();

        let states = RefCell::new(VecDeque::from(vec!["creating", "creating", "available"]));
        let calls = Cell::new(0);
        let poller = Poller::unbounded(Duration::from_millis(1));

        let got = ab!(poller.until(
            || {
                calls.set(calls.get() + 1);
                let s = states.borrow_mut().pop_front().unwrap_or("available");
                async move { Ok(s) }
            },
            |s| *s == "available",
        ))
        .unwrap();
        assert_eq!(got, "available");
        assert_eq!(calls.get(), 3);
    }

    /// RUST_LOG=debug cargo test --package ebs-manager --lib -- poll::tests::test_until_never_reaches_target --exact --show-output
    #[test]
    fn test_until_never_reaches_target() {
        let calls = Cell::new(0);
        let poller = Poller::unbounded(Duration::from_millis(0))
            .with_max_attempts(25);

        let ret = ab!(poller.until(
            || {
                calls.set(calls.get() + 1);
                async { Ok("in-use") }
            },
            |s| *s == "available",
        ));
        // only the injected bound stops the loop
        let err = ret.unwrap_err();
        assert!(err.retryable());
        assert_eq!(calls.get(), 25);
    }

    /// RUST_LOG=debug cargo test --package ebs-manager --lib -- poll::tests::test_until_timeout --exact --show-output
    #[test]
    fn test_until_timeout() {
        let poller = Poller::unbounded(Duration::from_millis(20))
            .with_timeout(Duration::from_millis(50));
        let ret = ab!(poller.until(|| async { Ok(0u8) }, |v| *v == 1));
        assert!(ret.unwrap_err().message().contains("in time"));
    }

    /// RUST_LOG=debug cargo test --package ebs-manager --lib -- poll::tests::test_until_propagates_error --exact --show-output
    #[test]
    fn test_until_propagates_error() {
        let calls = Cell::new(0);
        let poller = Poller::unbounded(Duration::from_millis(0));
        let ret: Result<u8> = ab!(poller.until(
            || {
                calls.set(calls.get() + 1);
                async {
                    Err(Error::API {
                        message: String::from("volume not found"),
                        retryable: false,
                    })
                }
            },
            |_| true,
        ));
        assert!(!ret.unwrap_err().retryable());
        assert_eq!(calls.get(), 1);
    }
}
