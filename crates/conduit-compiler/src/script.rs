//! Shell script generation for step commands.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use conduit_core::document::{Build, Step};

/// Variable holding the encoded script.
pub const SCRIPT_VAR: &str = "CONDUIT_BUILD_SCRIPT";

const SETUP: &str = r#"
cat <<EOF > $HOME/.netrc
machine $CONDUIT_NETRC_MACHINE
login $CONDUIT_NETRC_USERNAME
password $CONDUIT_NETRC_PASSWORD
EOF
chmod 0600 $HOME/.netrc

unset CONDUIT_NETRC_MACHINE
unset CONDUIT_NETRC_USERNAME
unset CONDUIT_NETRC_PASSWORD
unset CONDUIT_BUILD_SCRIPT
"#;

/// Builds the script for a list of commands: the netrc setup, then each
/// command echoed and run.
pub fn script(commands: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(SETUP);
    for command in commands {
        script.push_str(&format!("\necho $ {}\n{}\n", quote(command), command));
    }
    script
}

/// Single-quotes `s` for POSIX shells.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Replaces the commands of `step` with a single decode-and-run command.
/// Steps without commands are left alone.
pub fn script_step(step: &mut Step) {
    if step.commands.is_empty() {
        return;
    }

    let encoded = STANDARD.encode(script(&step.commands));
    let home = if step.user.is_empty() || step.user == "root" {
        "/root".to_string()
    } else {
        format!("/home/{}", step.user)
    };

    step.environment.insert(SCRIPT_VAR.to_string(), encoded);
    step.environment.insert("HOME".to_string(), home);
    step.environment.insert("SHELL".to_string(), "/bin/sh".to_string());
    step.entrypoint = vec!["/bin/sh".to_string(), "-c".to_string()];
    step.commands = vec![format!("echo ${SCRIPT_VAR} | base64 -d | /bin/sh -e")];
}

/// Scripts every step and secret origin of the build.
pub fn script_build(build: &mut Build) {
    for stage in &mut build.stages {
        stage.steps.iter_mut().for_each(script_step);
    }
    build.steps.iter_mut().for_each(script_step);
    build
        .secrets
        .iter_mut()
        .filter_map(|secret| secret.origin.as_mut())
        .for_each(script_step);
}
