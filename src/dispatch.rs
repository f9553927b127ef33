//! Canonical action dispatch.
//!
//! Every input method reduces to [`Action`]. This is the one place that decides what an
//! action does: move or commit the scan cursor, or call out to the host for navigation,
//! clearing, and speech. Pointing devices commit through their own dwell timer, so with no
//! scan running `Select` has nothing to act on.

use crate::event::Action;
use crate::host::{Host, TargetId};
use crate::scan::ScanEngine;
use crate::settings::ScanSettings;
use tracing::debug;

/// State an action may act on, borrowed from the engine for one dispatch.
pub struct DispatchContext<'a> {
    pub scan: &'a mut ScanEngine,
    /// When set, Next/Previous on an idle scan start a new scan with these settings.
    pub restart: Option<&'a ScanSettings>,
    pub host: &'a mut dyn Host,
}

/// What a dispatched action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Selected(TargetId),
    Moved,
    /// Scan was idle and has been restarted at the first target.
    Restarted,
    NavigatedBack,
    Cleared,
    Spoke,
    /// Nothing to act on (no highlighted target).
    Ignored,
}

pub fn dispatch_action(action: Action, ctx: DispatchContext<'_>) -> Dispatched {
    let DispatchContext {
        scan,
        restart,
        host,
    } = ctx;

    let outcome = match action {
        Action::Select => match scan.select(host) {
            Some(target) => Dispatched::Selected(target),
            None => Dispatched::Ignored,
        },
        Action::Next | Action::Previous => {
            let moved = if action == Action::Next {
                scan.next(host)
            } else {
                scan.previous(host)
            };
            match (moved, restart) {
                (true, _) => Dispatched::Moved,
                (false, Some(settings)) if scan.is_idle() => {
                    let targets = host.focusable_targets();
                    if scan.start(targets, settings.clone(), host) {
                        Dispatched::Restarted
                    } else {
                        Dispatched::Ignored
                    }
                }
                _ => Dispatched::Ignored,
            }
        }
        Action::Back => {
            host.navigate_back();
            Dispatched::NavigatedBack
        }
        Action::Clear => {
            host.clear_composition();
            Dispatched::Cleared
        }
        Action::Speak => {
            host.speak_current_selection();
            Dispatched::Spoke
        }
    };
    debug!("Dispatched {:?}: {:?}", action, outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, RecordingHost};
    use crate::settings::ScanMode;

    fn step_settings() -> ScanSettings {
        ScanSettings {
            mode: ScanMode::Step,
            ..ScanSettings::default()
        }
    }

    fn ctx<'a>(
        scan: &'a mut ScanEngine,
        host: &'a mut RecordingHost,
        restart: Option<&'a ScanSettings>,
    ) -> DispatchContext<'a> {
        DispatchContext {
            scan,
            restart,
            host,
        }
    }

    #[test]
    fn select_commits_scan_highlight() {
        let mut host = RecordingHost::new(["a", "b"]);
        let mut scan = ScanEngine::new(500);
        scan.start(host.focusable_targets(), step_settings(), &mut host);
        assert_eq!(
            dispatch_action(Action::Next, ctx(&mut scan, &mut host, None)),
            Dispatched::Moved
        );
        assert_eq!(
            dispatch_action(Action::Select, ctx(&mut scan, &mut host, None)),
            Dispatched::Selected("b".into())
        );
    }

    #[test]
    fn select_without_highlight_is_ignored() {
        let mut host = RecordingHost::new(["key-q"]);
        host.add_region("key-q", 0.0, 0.0, 100.0, 100.0);
        let mut scan = ScanEngine::new(500);
        assert_eq!(
            dispatch_action(Action::Select, ctx(&mut scan, &mut host, None)),
            Dispatched::Ignored
        );
        assert!(host.activations().is_empty());
    }

    #[test]
    fn next_on_idle_scan_restarts_when_allowed() {
        let mut host = RecordingHost::new(["a", "b"]);
        let mut scan = ScanEngine::new(500);
        assert_eq!(
            dispatch_action(Action::Next, ctx(&mut scan, &mut host, None)),
            Dispatched::Ignored
        );
        let settings = step_settings();
        assert_eq!(
            dispatch_action(Action::Next, ctx(&mut scan, &mut host, Some(&settings))),
            Dispatched::Restarted
        );
        assert_eq!(host.highlighted().as_deref(), Some("a"));
    }

    #[test]
    fn host_actions_reach_collaborators() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        for action in [Action::Back, Action::Clear, Action::Speak] {
            dispatch_action(action, ctx(&mut scan, &mut host, None));
        }
        assert_eq!(
            host.calls(),
            vec![HostCall::NavigateBack, HostCall::ClearComposition, HostCall::Speak]
        );
    }
}
