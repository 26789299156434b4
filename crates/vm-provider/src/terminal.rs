use std::io::Write;

const OSC_START: &str = "\x1b]777;";
const OSC_END: &str = "\x1b\\";

/// Tell terminals that track container sessions (OSC 777) that we entered
/// a unit, so tabs can be labelled.
pub fn emit_session_push(unit: &str, hostname: &str) {
    if stderr_is_terminal() {
        let marker = format!("{OSC_START}container;push;{hostname};vm;{unit}{OSC_END}");
        let _ = std::io::stderr().write_all(marker.as_bytes());
        let _ = std::io::stderr().flush();
    }
}

pub fn emit_session_pop() {
    if stderr_is_terminal() {
        let marker = format!("{OSC_START}container;pop;;{OSC_END}");
        let _ = std::io::stderr().write_all(marker.as_bytes());
        let _ = std::io::stderr().flush();
    }
}

pub fn print_session_banner(unit: &str, dir: &str) {
    if stderr_is_terminal() {
        eprintln!("\x1b[1;36m[vm]\x1b[0m connecting to \x1b[1m{unit}\x1b[0m at {dir}");
        eprintln!("\x1b[1;36m[vm]\x1b[0m press Ctrl-C twice within 2s to force-close the session");
    }
}

pub fn print_session_exit(unit: &str) {
    if stderr_is_terminal() {
        eprintln!("\x1b[1;36m[vm]\x1b[0m disconnected from {unit}");
    }
}

#[allow(unsafe_code)]
pub fn stdin_is_terminal() -> bool {
    // SAFETY: isatty() only inspects the descriptor.
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[allow(unsafe_code)]
pub fn stderr_is_terminal() -> bool {
    // SAFETY: isatty() only inspects the descriptor.
    unsafe { libc::isatty(libc::STDERR_FILENO) != 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_markers_dont_panic() {
        // Output depends on the terminal; only check these are safe to call.
        emit_session_push("demo-dev", "dev.demo.local");
        emit_session_pop();
        print_session_banner("demo-dev", "/workspace");
        print_session_exit("demo-dev");
        let _ = stdin_is_terminal();
    }
}
