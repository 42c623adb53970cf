//! Injected `init` and `clone` units.

use conduit_core::document::{Build, Pull, Stage, Step};
use conduit_core::{CLONE_NAME, INIT_IMAGE, INIT_NAME};

fn init_step() -> Step {
    Step {
        name: INIT_NAME.to_string(),
        image: INIT_IMAGE.to_string(),
        pull: Pull::NotPresent,
        ..Default::default()
    }
}

fn clone_step(image: &str) -> Step {
    Step {
        name: CLONE_NAME.to_string(),
        image: image.to_string(),
        pull: Pull::NotPresent,
        ..Default::default()
    }
}

/// Prepends `init` and, when cloning is enabled, `clone` to a step build.
pub(crate) fn inject_steps(build: &mut Build, clone_image: &str) {
    let mut steps = vec![init_step()];
    if build.metadata.clone_enabled() {
        steps.push(clone_step(clone_image));
    }
    steps.append(&mut build.steps);
    build.steps = steps;
}

/// Prepends an `init` stage and, when cloning is enabled, a `clone` stage
/// that every other stage needs.
pub(crate) fn inject_stages(build: &mut Build, clone_image: &str) {
    let clone_enabled = build.metadata.clone_enabled();

    let mut stages = vec![Stage {
        name: INIT_NAME.to_string(),
        steps: vec![init_step()],
        ..Default::default()
    }];
    if clone_enabled {
        stages.push(Stage {
            name: CLONE_NAME.to_string(),
            steps: vec![clone_step(clone_image)],
            ..Default::default()
        });
    }

    for mut stage in build.stages.drain(..) {
        if clone_enabled && !stage.needs.iter().any(|need| need == CLONE_NAME) {
            stage.needs.push(CLONE_NAME.to_string());
        }
        stages.push(stage);
    }
    build.stages = stages;
}
