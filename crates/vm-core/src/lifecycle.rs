use crate::CoreError;
use vm_provider::{Op, UnitState};

/// Check that `op` can act on a unit currently in `from`.
///
/// `up`, `destroy`, `kill`, `status` and `list` are accepted from any
/// state; the backend decides whether there is anything to do.
pub fn validate_transition(unit: &str, from: UnitState, op: Op) -> Result<(), CoreError> {
    let valid = matches!(
        (from, op),
        (_, Op::Up | Op::Destroy | Op::Kill | Op::Status | Op::List)
            | (
                UnitState::Created | UnitState::Running | UnitState::Stopped,
                Op::Halt | Op::Logs
            )
            | (UnitState::Running, Op::Ssh | Op::Exec | Op::Provision)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            unit: unit.to_owned(),
            from,
            op,
        })
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn hint(op: &Op, from: &UnitState) -> &'static str {
    match (op, from) {
        (_, UnitState::Absent) => " (run `vm up` to create it)",
        (Op::Ssh | Op::Exec | Op::Provision, _) => " (run `vm up` to start it)",
        _ => "",
    }
}
