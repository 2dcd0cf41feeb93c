//! Turning a resolved link chain into ordered, typed stages.
//!
//! The resolver hands over a production chain in execution order; the
//! assembler binds each stage's input and output types, inserts the
//! modifiers registered on each stage's input node, and groups jobs into
//! tasks along pipe-ability boundaries.

use super::task::{Job, Task};
use crate::caps::{IoFlags, Registry};
use crate::error::{Error, Result};
use crate::flags::BurnFlags;
use crate::negotiation::ChosenLink;
use crate::plugin::ProcessOrder;
use crate::session::Session;
use crate::track::TrackType;

/// Build the ordered task list for a chain in execution order.
///
/// Stage typing follows the chain: each stage consumes what the previous one
/// produced (the session input for the first), and produces the next stage's
/// input node type — the overall requested output for the last stage.
pub(crate) fn assemble_tasks(
    registry: &Registry,
    session: &Session,
    chain: &[ChosenLink],
    requested_output: &TrackType,
) -> Result<Vec<Task>> {
    if chain.is_empty() {
        return Err(Error::NotSupported);
    }

    let mut tasks: Vec<Task> = Vec::new();
    let mut current = Task::new();
    let mut stage_input = session.input;

    for (index, link) in chain.iter().enumerate() {
        let input_caps = registry.caps(link.target);
        let stage_output = if index + 1 < chain.len() {
            *registry.caps(chain[index + 1].target).track()
        } else {
            *requested_output
        };

        // a stage joins the running task only when its input node accepts a
        // pipe and the session elides temporary files
        let pipeable = input_caps.io().contains(IoFlags::ACCEPT_PIPE)
            && session.flags.contains(BurnFlags::NO_TMP_FILES);
        if index > 0 && !pipeable {
            tasks.push(std::mem::take(&mut current));
        }

        let position = if index == 0 {
            ProcessOrder::PREPROCESSING
        } else {
            ProcessOrder::BEFORE_TARGET
        };
        for &modifier in input_caps.modifiers() {
            let plugin = registry.plugin(modifier);
            if plugin.is_active(false) && plugin.process_order().contains(position) {
                current.jobs.push(Job {
                    plugin: modifier,
                    input: stage_input,
                    output: stage_input,
                });
            }
        }

        current.jobs.push(Job {
            plugin: link.plugin,
            input: stage_input,
            output: stage_output,
        });
        stage_input = stage_output;
    }

    // whatever processes the requested artifact itself runs last
    if let Some(last) = chain.last() {
        for &modifier in registry.caps(last.source).modifiers() {
            let plugin = registry.plugin(modifier);
            if plugin.is_active(false) && plugin.process_order().contains(ProcessOrder::AFTER_TARGET)
            {
                current.jobs.push(Job {
                    plugin: modifier,
                    input: *requested_output,
                    output: *requested_output,
                });
            }
        }
    }

    if !current.is_empty() {
        tasks.push(current);
    }
    tracing::debug!(tasks = tasks.len(), "assembled pipeline");
    Ok(tasks)
}
