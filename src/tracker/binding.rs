//! Which track each consumer (display, squat counter, gait recorder) attends to.
//!
//! Re-evaluated on every frame. With [`BindingPolicy::LowestId`] the attended
//! subject changes whenever a lower ID shows up; that is intended.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BindingConfig;
use crate::pose::{FrameRecord, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Display,
    Squat,
    Gait,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Display, Role::Squat, Role::Gait];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPolicy {
    /// 現フレームに存在する最小ID
    LowestId,
    /// 呼び出し側が指定したID。不在のフレームでは欠測になる
    Explicit(TrackId),
    /// 何も追跡しない
    Unbound,
}

/// One frame's resolution of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    /// Track is in this frame
    Present(TrackId),
    /// Explicitly selected track is missing from this frame
    Absent(TrackId),
    Unbound,
}

impl Binding {
    /// Key for per-track state, present or not.
    pub fn track_id(&self) -> Option<TrackId> {
        match *self {
            Binding::Present(id) | Binding::Absent(id) => Some(id),
            Binding::Unbound => None,
        }
    }

    /// Track whose pose can be read this frame.
    pub fn present(&self) -> Option<TrackId> {
        match *self {
            Binding::Present(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    pub display: Binding,
    pub squat: Binding,
    pub gait: Binding,
}

impl RoleBindings {
    pub fn get(&self, role: Role) -> Binding {
        match role {
            Role::Display => self.display,
            Role::Squat => self.squat,
            Role::Gait => self.gait,
        }
    }
}

impl Default for RoleBindings {
    fn default() -> Self {
        Self {
            display: Binding::Unbound,
            squat: Binding::Unbound,
            gait: Binding::Unbound,
        }
    }
}

pub struct TrackBinder {
    display: BindingPolicy,
    squat: BindingPolicy,
    gait: BindingPolicy,
    last: RoleBindings,
}

impl TrackBinder {
    pub fn new(policy: BindingPolicy) -> Self {
        Self {
            display: policy,
            squat: policy,
            gait: policy,
            last: RoleBindings::default(),
        }
    }

    pub fn from_config(config: &BindingConfig) -> Self {
        Self {
            display: config.display,
            squat: config.squat,
            gait: config.gait,
            last: RoleBindings::default(),
        }
    }

    pub fn policy(&self, role: Role) -> BindingPolicy {
        match role {
            Role::Display => self.display,
            Role::Squat => self.squat,
            Role::Gait => self.gait,
        }
    }

    pub fn set_policy(&mut self, role: Role, policy: BindingPolicy) {
        match role {
            Role::Display => self.display = policy,
            Role::Squat => self.squat = policy,
            Role::Gait => self.gait = policy,
        }
    }

    pub fn resolve_policy(policy: BindingPolicy, frame: &FrameRecord) -> Binding {
        match policy {
            BindingPolicy::LowestId => frame
                .lowest_track_id()
                .map_or(Binding::Unbound, Binding::Present),
            BindingPolicy::Explicit(id) => {
                if frame.pose(id).is_some() {
                    Binding::Present(id)
                } else {
                    Binding::Absent(id)
                }
            }
            BindingPolicy::Unbound => Binding::Unbound,
        }
    }

    pub fn resolve(&mut self, frame: &FrameRecord) -> RoleBindings {
        let bindings = RoleBindings {
            display: Self::resolve_policy(self.display, frame),
            squat: Self::resolve_policy(self.squat, frame),
            gait: Self::resolve_policy(self.gait, frame),
        };
        for role in Role::ALL {
            let (prev, next) = (self.last.get(role), bindings.get(role));
            if prev != next {
                debug!(
                    "frame {}: {:?} binding {:?} -> {:?}",
                    frame.frame_index, role, prev, next
                );
            }
        }
        self.last = bindings;
        bindings
    }

    pub fn last(&self) -> RoleBindings {
        self.last
    }
}
