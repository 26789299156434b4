use super::{core_failure, json_pretty, Invocation, EXIT_SUCCESS};
use console::style;
use vm_core::{Dispatcher, Outcome, Plan, Verb};

/// `up`, `ssh`, `halt`, `destroy`, `reload`, `provision`, `logs`, `exec`
/// and `kill`.
pub fn run(inv: &Invocation, verb: &Verb) -> Result<u8, String> {
    let project = inv.project()?;
    inv.ensure_prereqs(project.provider)?;
    let backend = inv.backend(project.provider);
    let dispatcher = Dispatcher::new(&inv.ctx, backend.as_ref());

    // Children of these verbs report their own failures on the terminal.
    let quiet = matches!(verb, Verb::Ssh { .. } | Verb::Exec { .. } | Verb::Logs { .. });

    match dispatcher.run(&project, verb) {
        Ok(Outcome::Plan(plan)) => print_plan(&plan, inv.json),
        Ok(Outcome::Done | Outcome::Status(_)) => {
            if let Some(done) = completion_message(verb) {
                eprintln!(
                    "{} {} {done}",
                    style("✓").green(),
                    project.spec.unit_name()
                );
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => core_failure(&e, quiet),
    }
}

fn completion_message(verb: &Verb) -> Option<&'static str> {
    match verb {
        Verb::Up | Verb::Reload => Some("is running"),
        Verb::Halt => Some("stopped"),
        Verb::Destroy => Some("destroyed"),
        Verb::Provision => Some("provisioned"),
        Verb::Kill => Some("killed"),
        _ => None,
    }
}

pub fn print_plan(plan: &Plan, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(plan)?);
    } else {
        println!(
            "dry run: {} {} ({}, config {})",
            plan.verb,
            plan.unit,
            plan.provider,
            plan.config_path.display()
        );
        for (i, step) in plan.steps.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }
    Ok(EXIT_SUCCESS)
}
