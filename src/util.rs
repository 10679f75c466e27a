use std::path::Path;
use std::process::ExitStatus;

/// Render argv as a line a human can paste back into a shell.
pub fn format_command_line<S: AsRef<str>>(argv: &[S]) -> String {
    shell_words::join(argv.iter().map(|arg| arg.as_ref()))
}

pub fn exit_status_string(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("{code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "terminated by signal".to_string()
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
