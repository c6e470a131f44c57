//! Boot planning: which provisioning routine runs after a wakeup.
//!
//! The device spends most of its life in deep sleep and wakes either from
//! the setup switch, from the periodic timer, or from a power-on reset.

/// Why the device resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// The setup switch pulled the wake pin.
    Switch,
    /// The periodic wake timer expired.
    Timer,
    /// Power-on or reset, not a wake from sleep.
    ColdBoot,
    /// Any other wake source.
    Other,
}

/// What the boot routine should do for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Run the setup portal to collect credentials.
    StartPortal,
    /// Join the stored network for a bounded time.
    Connect,
    /// Nothing to do; arm the next wake and sleep again.
    Sleep,
}

/// Decide the boot action.
///
/// A switch wake always opens the portal. Holding the switch through a cold
/// boot forces the portal even when credentials are stored.
pub fn plan_boot(cause: WakeCause, has_credentials: bool, switch_closed: bool) -> BootAction {
    match cause {
        WakeCause::Switch => BootAction::StartPortal,
        WakeCause::ColdBoot if switch_closed || !has_credentials => BootAction::StartPortal,
        WakeCause::ColdBoot | WakeCause::Timer if has_credentials => BootAction::Connect,
        _ => BootAction::Sleep,
    }
}
