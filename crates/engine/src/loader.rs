//! Runtime module location with bounded retry
//!
//! The host process may inject us before the game has mapped its runtime, so
//! module lookup is retried on a fixed schedule and then fails permanently.

use std::thread;
use std::time::Duration;

use uniresolve_sdk::RuntimeKind;

use crate::error::BridgeError;
use crate::symbols::NativeModule;

/// Bounded retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Sleep between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no waiting
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `attempt` until it yields a value or the bound is reached
    ///
    /// Returns the value and the 1-based attempt it succeeded on.
    pub fn run<T>(&self, what: &str, mut attempt: impl FnMut(u32) -> Option<T>) -> Option<(T, u32)> {
        let max = self.max_attempts.max(1);
        for n in 1..=max {
            if let Some(value) = attempt(n) {
                return Some((value, n));
            }
            if n < max {
                tracing::debug!("{}: attempt {}/{} failed, retrying in {:?}", what, n, max, self.delay);
                if !self.delay.is_zero() {
                    thread::sleep(self.delay);
                }
            }
        }
        tracing::warn!("{}: giving up after {} attempt(s)", what, max);
        None
    }
}

/// A runtime module found in the current process
pub struct LocatedRuntime {
    pub kind: RuntimeKind,
    pub module: NativeModule,
}

/// Find the managed runtime module mapped into this process
///
/// Mono candidates are probed before IL2Cpp candidates on every attempt.
#[tracing::instrument(skip_all)]
pub fn locate_runtime<S: AsRef<str>>(
    mono_modules: &[S],
    il2cpp_modules: &[S],
    policy: &RetryPolicy,
) -> Result<LocatedRuntime, BridgeError> {
    let candidates: Vec<(RuntimeKind, &str)> = mono_modules
        .iter()
        .map(|m| (RuntimeKind::Mono, m.as_ref()))
        .chain(il2cpp_modules.iter().map(|m| (RuntimeKind::Il2Cpp, m.as_ref())))
        .collect();

    let found = policy.run("locate runtime module", |_| {
        candidates.iter().find_map(|&(kind, name)| match NativeModule::open_loaded(name) {
            Ok(module) => Some(LocatedRuntime { kind, module }),
            Err(e) => {
                tracing::trace!("{}: {}", name, e);
                None
            }
        })
    });

    match found {
        Some((runtime, attempt)) => {
            tracing::info!(
                "Found {} runtime in {} (attempt {})",
                runtime.kind,
                runtime.module.name(),
                attempt
            );
            Ok(runtime)
        }
        None => Err(BridgeError::ModuleNotFound {
            attempts: policy.max_attempts.max(1),
            tried: candidates
                .iter()
                .map(|(_, name)| *name)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_succeeds_on_later_attempt() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result = policy.run("test", |n| {
            calls += 1;
            (n == 3).then_some("ready")
        });
        assert_eq!(result, Some(("ready", 3)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_is_bounded() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut calls = 0;
        let result: Option<((), u32)> = policy.run("test", |_| {
            calls += 1;
            None
        });
        assert!(result.is_none());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _ = RetryPolicy::new(0, Duration::ZERO).run("test", |_| {
            calls += 1;
            None::<()>
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_locate_reports_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = locate_runtime(&["no-such-mono-xyz"], &["no-such-il2cpp-xyz"], &policy);
        match result {
            Err(BridgeError::ModuleNotFound { attempts, tried }) => {
                assert_eq!(attempts, 3);
                assert_eq!(tried, "no-such-mono-xyz, no-such-il2cpp-xyz");
            }
            _ => panic!("expected ModuleNotFound"),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(RetryPolicy::once().max_attempts, 1);
    }
}
