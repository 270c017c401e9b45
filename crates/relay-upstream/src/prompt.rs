//! System prompt handed to the translator alongside the user's SMS.

use relay_core::Groups;

/// Group used in the worked examples when the snapshot is empty.
const EXAMPLE_GROUP: &str = "Living Room";

/// Build the translator system prompt from the current snapshot.
pub fn system_prompt(groups: &Groups) -> String {
    let names = groups.names();
    let example = names.first().unwrap_or(EXAMPLE_GROUP);
    let all = if names.is_empty() {
        format!(r#"["{EXAMPLE_GROUP}"]"#)
    } else {
        names.array_string()
    };

    format!(
        r#"You convert natural language text about Hue light groups into JSON.

Supported actions, one per line:
'''
status
update
'''

Requests should refer to one of the following groups or all groups:
'''
{names}'''

Current state of each group (brightness ranges from 0 to 254):
'''
{groups}'''

Examples of status requests and the JSON you should respond with:
    request:
    "What is the status of {lower}?"
    response:
    {{"type": "status", "data": {{"room": ["{example}"]}}}}

    request:
    "What is the status of all groups?"
    response:
    {{"type": "status", "data": {{"room": {all}}}}}

Examples of update requests and the JSON you should respond with:
    request:
    "Turn on the {lower} at half brightness"
    response:
    {{"type": "update", "data": {{"group": "{example}", "isOn": true, "brightness": 127}}}}

    request:
    "Turn off the {lower}"
    response:
    {{"type": "update", "data": {{"group": "{example}", "isOn": false}}}}

    request:
    "Turn on the {lower}"
    response:
    {{"type": "update", "data": {{"group": "{example}", "isOn": true}}}}

Your response should just be the json string not wrapped in any other text.
"#,
        names = names,
        groups = groups,
        lower = example.to_lowercase(),
        example = example,
        all = all,
    )
}
