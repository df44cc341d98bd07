//! # Access gate
//!
//! Allow/deny decisions for pages and actions. The decision is plain set
//! membership plus the ban flag; any role hierarchy is expressed by building
//! the required set with [`RoleSet::at_least`], which reads
//! [`Role::HIERARCHY`].

use std::fmt;

use crate::models::{Profile, Role};

/// A set of roles, at most four members.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    pub const fn only(role: Role) -> Self {
        RoleSet(Self::bit(role))
    }

    pub fn of(roles: &[Role]) -> Self {
        roles.iter().fold(Self::empty(), |set, role| set.with(*role))
    }

    /// Every role, i.e. any signed-in caller who is not banned.
    pub fn all() -> Self {
        Self::of(&Role::HIERARCHY)
    }

    /// `role` and every role above it in [`Role::HIERARCHY`].
    pub fn at_least(role: Role) -> Self {
        Self::of(&Role::HIERARCHY[role.rank()..])
    }

    pub const fn with(self, role: Role) -> Self {
        RoleSet(self.0 | Self::bit(role))
    }

    pub const fn contains(&self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::HIERARCHY.into_iter().filter(|role| self.contains(*role))
    }

    const fn bit(role: Role) -> u8 {
        match role {
            Role::Viewer => 1,
            Role::Moderator => 1 << 1,
            Role::Streamer => 1 << 2,
            Role::Admin => 1 << 3,
        }
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// `!is_banned && required.contains(role)`. A ban always wins.
pub fn check_access(role: Role, is_banned: bool, required: &RoleSet) -> bool {
    !is_banned && required.contains(role)
}

/// The two profile attributes the gate looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileAccess {
    pub role: Role,
    pub is_banned: bool,
}

impl From<&Profile> for ProfileAccess {
    fn from(profile: &Profile) -> Self {
        Self {
            role: profile.role,
            is_banned: profile.is_banned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No profile: no session, fetch failed, or fetch timed out.
    Unresolved,
    Banned,
    InsufficientRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// [`check_access`] with the reason kept for logging.
pub fn decide(caller: Option<ProfileAccess>, required: &RoleSet) -> AccessDecision {
    match caller {
        None => AccessDecision::Denied(DenyReason::Unresolved),
        Some(access) if check_access(access.role, access.is_banned, required) => {
            AccessDecision::Allowed
        }
        Some(access) if access.is_banned => AccessDecision::Denied(DenyReason::Banned),
        Some(_) => AccessDecision::Denied(DenyReason::InsufficientRole),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unknown,
    Checking,
    Allowed,
    Denied(DenyReason),
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Allowed | GateState::Denied(_))
    }
}

/// One evaluation of the gate for one page or action.
///
/// `Unknown -> Checking -> Allowed | Denied`. Once settled it stays settled;
/// re-checking means constructing a new evaluation.
#[derive(Debug, Clone)]
pub struct GateEvaluation {
    required: RoleSet,
    state: GateState,
}

impl GateEvaluation {
    pub fn new(required: RoleSet) -> Self {
        Self {
            required,
            state: GateState::Unknown,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn required(&self) -> &RoleSet {
        &self.required
    }

    /// Marks the caller's profile as being resolved.
    pub fn begin(&mut self) -> GateState {
        if self.state == GateState::Unknown {
            self.state = GateState::Checking;
        }
        self.state
    }

    /// Settles the evaluation. `None` means the profile could not be resolved.
    pub fn resolve(&mut self, caller: Option<ProfileAccess>) -> GateState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = match decide(caller, &self.required) {
            AccessDecision::Allowed => GateState::Allowed,
            AccessDecision::Denied(reason) => GateState::Denied(reason),
        };
        self.state
    }
}
