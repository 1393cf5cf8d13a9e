//! Prompt assembly for the Decision Engine.
//!
//! The user message follows a fixed field order the models were tuned
//! against: execution error, URL, marked element tags, task, action log,
//! task arguments. The system block carries the action vocabulary and the
//! reply format contract that [`crate::actions::parser`] enforces.

use crate::agent::Task;
use crate::env::Observation;
use std::fmt::Write;

/// Marker the model must emit before its code block. The extractor in the
/// Decision Engine searches for this literal sequence.
pub const CODE_MARKER: &str = "\nCode:\n```python\n";

/// System instruction block for the single-action contract.
pub const SYSTEM_PROMPT: &str = r#"You are an AI agent that controls a webpage using python code, in order to achieve a task.
You are provided a screenshot of the webpage at each timeframe, and you decide on the next python line to execute.
You can use the following functions:
- actions.click(element_id) # click on an element
- actions.input_text(element_id, text, clear_before_input, log_message) # Use clear_before_input=True to replace the text instead of appending to it. Never use this method on a combobox.
- actions.upload_files(element_id, files, log_message) # use this instead of click if clicking is expected to open a file picker
- actions.scroll(direction, log_message) # scroll the page up or down. direction is either 'up' or 'down'.
- actions.combobox_select(element_id, option, log_message) # select an option from a combobox.
- actions.finish(did_succeed, output, reason) # the task is complete with did_succeed=True or False, and a text reason. output is an optional dictionary of output values if the task succeeded, otherwise None.
- actions.act(url, task, log_message, **kwargs) # run another agent on a different webpage. The sub-agent will run until it finishes and will output a result which you can use later. Useful for getting auth details from email for example.
                                                # task should be described in natural language. kwargs are additional arguments the sub-agent needs to complete the task. YOU MUST PROVIDE ALL NEEDED ARGUMENTS, OTHERWISE THE SUB-AGENT WILL FAIL.
element_id is always an integer, and is visible as a green label with a white number around the TOP-LEFT CORNER OF EACH ELEMENT. Make sure to examine all green highlighted elements before choosing one to interact with.
log_message is a short one sentence explanation of what the action does.
Do not use keyword arguments, all arguments are positional.

IMPORTANT: ONLY ONE WEBPAGE FUNCTION CALL IS ALLOWED, EXCEPT FOR FORMS WHERE MULTIPLE CALLS ARE ALLOWED TO FILL MULTIPLE FIELDS! NOTHING IS ALLOWED AFTER THE "```" ENDING THE CODE BLOCK
IMPORTANT: LOOK FOR CUES IN THE SCREENSHOTS TO SEE WHAT PARTS OF THE TASK ARE COMPLETED AND WHAT PARTS ARE NOT. FOR EXAMPLE, IF YOU ARE ASKED TO BUY A PRODUCT, LOOK FOR CUES THAT THE PRODUCT IS IN THE CART.
Response format:

Reasoning:
Explanation for the next action, particularly focusing on interpreting the attached screenshot image.

Code:
```python
# variable definitions and non-webpage function calls are allowed
...
# a single webpage function call.
actions.func_name(args..)
```"#;

/// System instruction block for the multi-candidate mode: exactly ten
/// distinct proposals for the current frame, used for offline ranking.
pub const CANDIDATE_SYSTEM_PROMPT: &str = r#"You are an AI agent that controls a webpage using python code, in order to achieve a task.
You are provided a screenshot of the webpage at each timeframe, and you decide on the next python line to execute.

Please provide a list of the top ten actions you would take ON THE CURRENT FRAME. There should be exactly 10 different answers in the response.
Only specify actions to take ON THE CURRENT FRAME.

You can use the following functions:
- actions.click(element_id) # click on an element
- actions.input_text(element_id, text, clear_before_input, log_message) # Use clear_before_input=True to replace the text instead of appending to it. Never use this method on a combobox.
- actions.scroll(direction, log_message) # scroll the page up or down. direction is either 'up' or 'down'.
- actions.finish(did_succeed, output, reason) # the task is complete with did_succeed=True or False, and a text reason. output is an optional dictionary of output values if the task succeeded, otherwise None.
element_id is always an integer, and is visible as a green label with a white number around the TOP-LEFT CORNER OF EACH ELEMENT.
log_message is a short one sentence explanation of what the action does.
Do not use keyword arguments, all arguments are positional.

IMPORTANT: LOOK FOR CUES IN THE SCREENSHOTS TO SEE WHAT PARTS OF THE TASK ARE COMPLETED AND WHAT PARTS ARE NOT.
Response format:

Reasoning:
Explanation for the next action, particularly focusing on interpreting the attached screenshot image.

Code:
```python
# variable definitions and non-webpage function calls are allowed
...
# top ten webpage function calls, in any order. THEY SHOULD NOT BE IDENTICAL.
actions.func_name1(args..)
actions.func_name2(args..)
actions.func_name3(args..)
actions.func_name4(args..)
actions.func_name5(args..)
actions.func_name6(args..)
actions.func_name7(args..)
actions.func_name8(args..)
actions.func_name9(args..)
actions.func_name10(args..)
```"#;

/// The user-facing half of the request, in the fixed field order.
pub fn user_message(task: &Task, observation: &Observation, history_window: usize) -> String {
    let marked_elements_tags = observation
        .marked_elements
        .iter()
        .map(|(id, elem)| format!("({id}) - <{}>", elem.tag.to_lowercase()))
        .collect::<Vec<_>>()
        .join(", ");

    let log_history = window(&observation.log_history, history_window).join("\n");

    let args = serde_json::to_string_pretty(&observation_args(task))
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        "Execution error:\n{error}\n\n\
         URL:\n{url}\n\n\
         Summary of page contents:\n{marked_elements_tags}\n\n\
         Task:\n{task}\n\n\
         Log of last actions:\n{log_history}\n\n\
         Task Arguments:\n{args}\n",
        error = observation.error_message.as_deref().unwrap_or(""),
        url = observation.url,
        task = task.description,
    )
}

fn observation_args(task: &Task) -> serde_json::Value {
    serde_json::Value::Object(task.args.clone())
}

/// Last `window` entries of the action log, oldest first. A window of 0
/// disables history.
pub fn window(log_history: &[String], window: usize) -> &[String] {
    let start = log_history.len().saturating_sub(window);
    &log_history[start..]
}

/// Short grounding sample of `(id -> visible text)` pairs, capped at
/// `limit` elements with non-empty text, appended to the system block so the
/// model's id references stay anchored to what it can actually see.
pub fn element_sample(observation: &Observation, limit: usize) -> Option<String> {
    let mut sample = String::new();
    let mut taken = 0usize;
    for (id, elem) in &observation.marked_elements {
        if taken == limit {
            break;
        }
        let text = elem.text.trim();
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(sample, "({id}) -> \"{text}\"");
        taken += 1;
    }
    if taken == 0 {
        None
    } else {
        Some(format!("\nVisible text of some elements:\n{sample}"))
    }
}
