//! Toggle policy for a single device.
//!
//! A decision is computed by folding an [`Evaluation`] through an ordered list
//! of stages. Each stage either refines the desired state or settles the
//! verdict; once a verdict is set the remaining stages are skipped.
//!
//! ```text
//! Automatic: type-desired -> sleep override -> interval gate -> forced rule
//! Explicit:                                    interval gate -> forced rule
//! ```

use chrono::DateTime;
use chrono::Utc;

use super::state::Device;
use super::state::DeviceType;

/// Below this temperature a floor heating is switched on.
pub const COLD_THRESHOLD: f64 = 25.0;

/// At or above this temperature a floor heating is switched off.
pub const OVERHEATING_THRESHOLD: f64 = 38.0;

/// What the caller wants from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Let the device type decide, honouring sleep and forced state.
    Automatic,

    /// Switch to `state`. `forced` marks a user override.
    Explicit { state: bool, forced: bool },
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Reason {
    Allowed,
    EnteredForced,
    IntervalNotElapsed,
    NoChange,
    ForcedOverrideActive,
    MissingTemperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allow: bool,

    /// Power state the device should end up in.
    pub target: bool,

    /// Forced flag to persist alongside the switch.
    pub power_forced: bool,

    pub reason: Reason,
}

/// Working copy of everything the stages look at.
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    now: DateTime<Utc>,
    device_type: DeviceType,
    power_on: bool,
    is_dark: bool,
    is_sleep: bool,
    temperature: Option<f64>,
    next_switch_at: Option<DateTime<Utc>>,
    forced: bool,
    power_forced: bool,
    desired: bool,
    verdict: Option<(bool, Reason)>,
}

type Stage = fn(Evaluation) -> Evaluation;

const AUTOMATIC_STAGES: &[Stage] = &[type_desired, sleep_override, interval_gate, forced_rule];
const EXPLICIT_STAGES: &[Stage] = &[interval_gate, forced_rule];

/// Decide whether `device` may be switched at `now`.
///
/// Pure: the same snapshot, request and time always give the same decision.
pub fn decide(device: &Device, request: Request, now: DateTime<Utc>) -> Decision {
    let (stages, desired, forced) = match request {
        Request::Automatic => (AUTOMATIC_STAGES, device.power_on, false),
        Request::Explicit { state, forced } => (EXPLICIT_STAGES, state, forced),
    };

    let initial = Evaluation {
        now,
        device_type: device.device_type,
        power_on: device.power_on,
        is_dark: device.is_dark,
        is_sleep: device.is_sleep,
        temperature: device.temperature,
        next_switch_at: device.next_switch_allowed_at(),
        forced,
        power_forced: device.is_power_forced,
        desired,
        verdict: None,
    };

    let evaluation = stages.iter().fold(initial, |eval, stage| {
        if eval.verdict.is_some() {
            eval
        } else {
            stage(eval)
        }
    });

    let (allow, reason) = evaluation.verdict.unwrap_or((false, Reason::NoChange));
    Decision {
        allow,
        target: evaluation.desired,
        power_forced: evaluation.power_forced,
        reason,
    }
}

fn type_desired(mut eval: Evaluation) -> Evaluation {
    match eval.device_type {
        DeviceType::DeskLight => eval.desired = eval.is_dark,
        DeviceType::FloorHeating => match eval.temperature {
            Some(t) if t < COLD_THRESHOLD => eval.desired = true,
            Some(t) if t < OVERHEATING_THRESHOLD => eval.desired = eval.power_on,
            Some(_) => eval.desired = false,
            None => eval.verdict = Some((false, Reason::MissingTemperature)),
        },
    }
    eval
}

fn sleep_override(mut eval: Evaluation) -> Evaluation {
    if eval.is_sleep {
        eval.desired = false;
    }
    eval
}

fn interval_gate(mut eval: Evaluation) -> Evaluation {
    if let Some(next) = eval.next_switch_at {
        if eval.now < next {
            eval.verdict = Some((false, Reason::IntervalNotElapsed));
        }
    }
    eval
}

fn forced_rule(mut eval: Evaluation) -> Evaluation {
    eval.verdict = Some(match (eval.power_forced, eval.forced) {
        (true, true) | (false, false) => {
            if eval.desired != eval.power_on {
                (true, Reason::Allowed)
            } else {
                (false, Reason::NoChange)
            }
        }
        (false, true) => {
            eval.power_forced = true;
            (true, Reason::EnteredForced)
        }
        (true, false) => (false, Reason::ForcedOverrideActive),
    });
    eval
}
