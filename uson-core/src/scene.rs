//! Scene selection
//!
//! Each UI scene declares when it applies; the first match in
//! [`PRIORITY`] is shown. Link problems outrank everything else.

use uson_protocol::{AppStage, DeviceStateSnapshot, StartupStage};

use crate::liveness::LinkPresentation;

/// Inputs to scene selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SceneContext {
    pub link: LinkPresentation,
    /// Last accepted device state, if any
    pub state: Option<DeviceStateSnapshot>,
}

/// UI scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppId {
    LinkDown,
    Recovering,
    /// No state yet, or the device is still starting
    Booting,
    Mp3Player,
    /// Searching for the LA tone
    Tuning,
    Listening,
    Functional,
    Idle,
}

/// Evaluation order; the first matching scene wins
pub const PRIORITY: [AppId; 8] = [
    AppId::LinkDown,
    AppId::Recovering,
    AppId::Booting,
    AppId::Mp3Player,
    AppId::Listening,
    AppId::Functional,
    AppId::Tuning,
    AppId::Idle,
];

impl AppId {
    /// Whether this scene applies to `ctx`
    pub fn matches(self, ctx: &SceneContext) -> bool {
        let stage = ctx.state.map(|s| s.app_stage);
        match self {
            AppId::LinkDown => ctx.link == LinkPresentation::Down,
            AppId::Recovering => ctx.link == LinkPresentation::Recovering,
            AppId::Booting => ctx
                .state
                .map_or(true, |s| s.startup_stage == StartupStage::Booting),
            AppId::Mp3Player => stage == Some(AppStage::Mp3),
            AppId::Listening => stage == Some(AppStage::Listening),
            AppId::Functional => stage == Some(AppStage::Functional),
            AppId::Tuning => ctx
                .state
                .map_or(false, |s| s.app_stage == AppStage::Waiting && s.la_detected),
            AppId::Idle => true,
        }
    }
}

/// Pick the scene for `ctx`
pub fn select(ctx: &SceneContext) -> Option<AppId> {
    PRIORITY.iter().copied().find(|app| app.matches(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(link: LinkPresentation, state: Option<DeviceStateSnapshot>) -> SceneContext {
        SceneContext { link, state }
    }

    fn ready(stage: AppStage) -> DeviceStateSnapshot {
        DeviceStateSnapshot {
            startup_stage: StartupStage::Ready,
            app_stage: stage,
            ..Default::default()
        }
    }

    #[test]
    fn test_link_down_outranks_state() {
        let c = ctx(LinkPresentation::Down, Some(ready(AppStage::Mp3)));
        assert_eq!(select(&c), Some(AppId::LinkDown));

        let c = ctx(LinkPresentation::Recovering, Some(ready(AppStage::Mp3)));
        assert_eq!(select(&c), Some(AppId::Recovering));
    }

    #[test]
    fn test_booting_without_state() {
        assert_eq!(
            select(&ctx(LinkPresentation::Up, None)),
            Some(AppId::Booting)
        );

        let mut s = ready(AppStage::Mp3);
        s.startup_stage = StartupStage::Booting;
        assert_eq!(
            select(&ctx(LinkPresentation::Up, Some(s))),
            Some(AppId::Booting)
        );
    }

    #[test]
    fn test_stage_scenes() {
        let up = |stage| select(&ctx(LinkPresentation::Up, Some(ready(stage))));
        assert_eq!(up(AppStage::Mp3), Some(AppId::Mp3Player));
        assert_eq!(up(AppStage::Listening), Some(AppId::Listening));
        assert_eq!(up(AppStage::Functional), Some(AppId::Functional));
        assert_eq!(up(AppStage::Waiting), Some(AppId::Idle));

        let mut s = ready(AppStage::Waiting);
        s.la_detected = true;
        assert_eq!(
            select(&ctx(LinkPresentation::Up, Some(s))),
            Some(AppId::Tuning)
        );
    }

    #[test]
    fn test_priority_lists_every_scene_once() {
        for app in PRIORITY {
            assert_eq!(PRIORITY.iter().filter(|&&a| a == app).count(), 1);
        }
        assert_eq!(PRIORITY.last(), Some(&AppId::Idle));
    }
}
