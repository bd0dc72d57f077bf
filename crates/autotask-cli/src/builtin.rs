//! Callables every `autotask` binary registers, so a stock install can run
//! work enqueued from the command line.

use std::time::Duration;

use autotask_tasks::{BoxError, Registry, TaskArgs};
use serde_json::Value;

pub const MODULE: &str = "autotask.builtin";

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(MODULE, "echo", echo);
    registry.register(MODULE, "sleep", sleep);
    registry.register(MODULE, "fail", fail);
    registry
}

/// Returns its first positional argument, or `null`.
fn echo(args: TaskArgs) -> Result<Value, BoxError> {
    Ok(args.args.into_iter().next().unwrap_or(Value::Null))
}

/// Sleeps for `args[0]` seconds (fractions allowed) and returns the duration.
fn sleep(args: TaskArgs) -> Result<Value, BoxError> {
    let secs: f64 = args.get(0)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid sleep duration {secs}").into());
    }
    std::thread::sleep(Duration::from_secs_f64(secs));
    Ok(Value::from(secs))
}

/// Always fails with the `message` keyword argument.
fn fail(args: TaskArgs) -> Result<Value, BoxError> {
    let message: Option<String> = args.get_kwarg("message")?;
    Err(message.unwrap_or_else(|| "failed on request".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.resolve(MODULE, "echo").is_some());
    }

    #[test]
    fn echo_and_fail() {
        assert_eq!(echo(TaskArgs::new().arg("hi")).unwrap(), json!("hi"));
        assert_eq!(echo(TaskArgs::new()).unwrap(), Value::Null);
        let err = fail(TaskArgs::new().kwarg("message", "nope")).unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn sleep_rejects_negative() {
        assert!(sleep(TaskArgs::new().arg(-1.0)).is_err());
        assert_eq!(sleep(TaskArgs::new().arg(0.0)).unwrap(), json!(0.0));
    }
}
