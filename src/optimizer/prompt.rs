use serde_json::Value;

/// Default instruction-proposal prompt.
///
/// Exactly two placeholders: `<curr_instructions>` (the component's current
/// text) and `<inputs_outputs_feedback>` (the component's reflective records
/// rendered as Markdown).
pub const INSTRUCTION_PROPOSAL_PROMPT: &str = "\
I provided an assistant with the following instructions to perform a task for me:

```
<curr_instructions>
```

The following are examples of different task inputs provided to the assistant
along with the assistant's response for each of them, and feedback on how the
assistant's response could be better:

```
<inputs_outputs_feedback>
```

Your task is to write a better instruction for the assistant.

Read the examples carefully and identify what worked and what failed. If the
examples expose domain-specific facts or strategies the assistant needs,
include them in the instruction — the assistant may not have them otherwise.

Provide the new instruction within ``` blocks.
";

pub(crate) fn render_proposal_prompt(current_text: &str, records: &[Value]) -> String {
    INSTRUCTION_PROPOSAL_PROMPT
        .replace("<curr_instructions>", current_text)
        .replace("<inputs_outputs_feedback>", &render_records(records))
}

/// Renders reflective records as a Markdown hierarchy: `# Example N` per
/// record, `## key` per top-level field, `### nested key` one level deeper.
fn render_records(records: &[Value]) -> String {
    let mut out = String::new();
    for (index, record) in records.iter().enumerate() {
        out.push_str(&format!("# Example {}\n", index + 1));
        match record {
            Value::Object(fields) => {
                for (key, value) in fields {
                    out.push_str(&format!("## {key}\n"));
                    match value {
                        Value::Object(nested) => {
                            for (nested_key, nested_value) in nested {
                                out.push_str(&format!(
                                    "### {nested_key}\n{}\n\n",
                                    value_text(nested_value)
                                ));
                            }
                        }
                        other => out.push_str(&format!("{}\n\n", value_text(other))),
                    }
                }
            }
            other => out.push_str(&format!("{}\n\n", value_text(other))),
        }
    }
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Extracts the content between the last pair of triple-backtick fences.
///
/// Robust to a missing closing fence (everything after the last opener), a
/// language tag on the opening fence, and no fences at all (the trimmed
/// response is used verbatim).
pub(crate) fn extract_fenced_block(response: &str) -> String {
    let fences: Vec<usize> = response.match_indices("```").map(|(idx, _)| idx).collect();
    let body = match fences.len() {
        0 => return response.trim().to_string(),
        1 => &response[fences[0] + 3..],
        n => &response[fences[n - 2] + 3..fences[n - 1]],
    };
    strip_language_tag(body).trim().to_string()
}

fn strip_language_tag(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first_line, rest)) => {
            let tag = first_line.trim();
            let looks_like_tag = !tag.is_empty()
                && tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+');
            if looks_like_tag { rest } else { body }
        }
        None => body,
    }
}
