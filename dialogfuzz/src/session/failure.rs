//! Crash-threshold exhaustion and target restart. Grounded on
//! `original_source/boofuzz/sessions.py`'s `_process_failures` (threshold
//! + skip-forward) and `restart_target` (hook priority order, and a
//! configured restart method's own failure being fatal rather than a
//! retry signal).

use crate::error::{FuzzError, FuzzResult};
use crate::graph::Graph;
use crate::monitor::Monitor;
use crate::session::traversal::Traversal;

/// Per-primitive failure counters, keyed by (path terminal node id,
/// descendant cursor within that node) rather than by mutant index —
/// the same primitive stays at the same cursor position across every one
/// of its library values, so this is what accumulates "N crashes against
/// this one primitive" instead of resetting every case.
#[derive(Debug, Default)]
pub struct FailureCounters {
    counts: ahash::AHashMap<(usize, usize), u32>,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: usize, descendant_cursor: usize) -> u32 {
        let entry = self.counts.entry((node, descendant_cursor)).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn reset_for(&mut self, node: usize, descendant_cursor: usize) {
        self.counts.remove(&(node, descendant_cursor));
    }
}

/// Decide what to do after a crash is observed on the current case.
/// Returns `true` if the current primitive should be treated as
/// exhausted and the traversal fast-forwarded past its remaining
/// mutations. A `Repeat`/`Group` descendant is excluded: fuzzing its
/// count/gate values doesn't exhaust a "library" the way a plain
/// primitive's does.
pub fn should_exhaust_current_primitive(
    graph: &Graph,
    terminal_node: usize,
    failures: &mut FailureCounters,
    crash_threshold: u32,
) -> bool {
    let Some(request) = graph.request(terminal_node) else {
        return false;
    };
    let Some(cursor) = request.current_descendant_cursor() else {
        return false;
    };
    let count = failures.record(terminal_node, cursor);
    if count < crash_threshold {
        return false;
    }
    !request.current_mutant_is_repeat_or_group()
}

/// Apply the skip-forward consequence of exhaustion: advance both the
/// traversal's case cursor and the request's internal cursor past the
/// primitive's remaining mutations. Returns the number of cases skipped,
/// for the caller to fold into `total_mutant_index`.
pub fn exhaust_and_skip(traversal: &mut Traversal, graph: &mut Graph) -> u64 {
    traversal.skip_current_primitive(graph)
}

/// `restart_target`'s priority order: an `on_failure` hook if one is
/// registered, else the monitor's own restart method, else sleep and hope
/// the target recovers on its own.
pub struct RestartPolicy<'a> {
    pub on_failure: Option<&'a dyn Fn() -> FuzzResult<()>>,
    pub restart_sleep_time: std::time::Duration,
}

/// A configured restart method failing is fatal (`monitor.restart_target`
/// returning `Err`, meaning it tried and failed) and must not be
/// conflated with "no restart method is configured" (`Ok(false)`), which
/// alone triggers the sleep-then-recheck-aliveness fallback: sleeping
/// after a restart method has already told us it failed would silently
/// mask that failure as an ordinary transient hiccup.
pub fn restart_target(policy: &RestartPolicy<'_>, monitor: &mut dyn Monitor) -> FuzzResult<()> {
    if let Some(hook) = policy.on_failure {
        return hook().map_err(|e| FuzzError::UserHook(Box::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))));
    }
    match monitor.restart_target()? {
        true => Ok(()),
        false => {
            std::thread::sleep(policy.restart_sleep_time);
            if monitor.alive()? {
                Ok(())
            } else {
                Err(FuzzError::RestartFailure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::monitor::NullMonitor;
    use crate::primitive::Primitive;
    use crate::request::{ElementSpec, Request};

    fn graph_with_one_node(library_len: usize) -> (Graph, usize) {
        let mut graph = Graph::new();
        let library = (0..library_len).map(|i| vec![i as u8]).collect();
        let request = Request::build(
            "a",
            vec![ElementSpec::Leaf(Primitive::FuzzableBytes {
                name: Some("p".into()),
                default: vec![0],
                library,
                index: 0,
                fuzzable: true,
            })],
        )
        .unwrap();
        let a = graph.add_request(request);
        graph.add_edge(graph.root(), a, None).unwrap();
        (graph, a)
    }

    #[test]
    fn exhausts_after_reaching_threshold() {
        let (graph, a) = graph_with_one_node(10);
        let mut failures = FailureCounters::new();
        assert!(!should_exhaust_current_primitive(&graph, a, &mut failures, 2));
        assert!(should_exhaust_current_primitive(&graph, a, &mut failures, 2));
    }

    #[test]
    fn restart_prefers_on_failure_hook() {
        let called = std::cell::Cell::new(false);
        let hook = || {
            called.set(true);
            Ok(())
        };
        let policy = RestartPolicy {
            on_failure: Some(&hook),
            restart_sleep_time: std::time::Duration::from_millis(0),
        };
        let mut monitor = NullMonitor;
        restart_target(&policy, &mut monitor).unwrap();
        assert!(called.get());
    }

    #[test]
    fn restart_falls_back_to_monitor_when_no_hook() {
        let policy = RestartPolicy {
            on_failure: None,
            restart_sleep_time: std::time::Duration::from_millis(0),
        };
        let mut monitor = NullMonitor;
        assert!(restart_target(&policy, &mut monitor).is_ok());
    }

    #[derive(Default)]
    struct FailingRestartMonitor;

    impl crate::monitor::Monitor for FailingRestartMonitor {
        fn alive(&mut self) -> FuzzResult<bool> {
            Ok(true)
        }
        fn get_crash_synopsis(&mut self) -> FuzzResult<Option<String>> {
            Ok(None)
        }
        fn restart_target(&mut self) -> FuzzResult<bool> {
            Err(FuzzError::Configuration("restart script exited non-zero".into()))
        }
    }

    #[test]
    fn restart_is_fatal_when_configured_method_fails() {
        let policy = RestartPolicy {
            on_failure: None,
            restart_sleep_time: std::time::Duration::from_millis(0),
        };
        let mut monitor = FailingRestartMonitor;
        assert!(restart_target(&policy, &mut monitor).is_err());
    }
}
