use super::{
    colorize_state, core_failure, json_pretty, spin_done, spinner, Invocation, EXIT_SUCCESS,
};
use vm_core::{Dispatcher, Outcome, Verb};

pub fn run(inv: &Invocation) -> Result<u8, String> {
    let project = inv.project()?;
    inv.ensure_prereqs(project.provider)?;
    let backend = inv.backend(project.provider);
    let dispatcher = Dispatcher::new(&inv.ctx, backend.as_ref());

    let pb = spinner(&format!("checking {}...", project.spec.unit_name()));
    let result = dispatcher.run(&project, &Verb::Status);
    spin_done(&pb);

    match result {
        Ok(Outcome::Status(status)) => {
            if inv.json {
                println!("{}", json_pretty(&status)?);
            } else {
                println!("unit:     {}", status.unit);
                println!("provider: {}", status.provider);
                println!("state:    {}", colorize_state(&status.state.to_string()));
                if let Some(detail) = &status.detail {
                    println!("detail:   {detail}");
                }
                println!("project:  {}", project.spec.project_dir.display());
            }
            Ok(EXIT_SUCCESS)
        }
        Ok(Outcome::Plan(plan)) => super::lifecycle::print_plan(&plan, inv.json),
        Ok(Outcome::Done) => Ok(EXIT_SUCCESS),
        Err(e) => core_failure(&e, false),
    }
}
