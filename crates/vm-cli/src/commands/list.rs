use super::{
    colorize_state, core_failure, json_pretty, spin_done, spinner, Invocation, EXIT_SUCCESS,
};
use vm_config::Provider;
use vm_core::Dispatcher;
use vm_provider::UnitSummary;

pub fn run(inv: &Invocation, provider: Option<&str>) -> Result<u8, String> {
    let provider = match provider {
        Some(p) => p.parse::<Provider>().map_err(|e| e.to_string())?,
        None => inv.project()?.provider,
    };
    inv.ensure_prereqs(provider)?;

    let backend = inv.backend(provider);
    let pb = spinner(&format!("querying {provider}..."));
    let result = Dispatcher::new(&inv.ctx, backend.as_ref()).list();
    spin_done(&pb);
    let units = match result {
        Ok(units) => units,
        Err(e) => return core_failure(&e, false),
    };

    if inv.json {
        println!("{}", json_pretty(&units)?);
    } else if units.is_empty() {
        println!("no {provider} environments found");
    } else {
        print_table(&units);
    }
    Ok(EXIT_SUCCESS)
}

fn print_table(units: &[UnitSummary]) {
    println!("{:<24} {:<20} STATE", "NAME", "PROJECT");
    for unit in units {
        println!(
            "{:<24} {:<20} {}",
            unit.name,
            unit.project.as_deref().unwrap_or("-"),
            colorize_state(&unit.state)
        );
    }
}
