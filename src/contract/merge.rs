//! Overlay of an agent's per-tool customisation onto the published tool.
//!
//! Agents may pin defaults, bind variables and hide fields for the tools they
//! use. Everything else (types, descriptions, required lists) always comes from
//! the published contract.

use crate::contract::{MediaContent, Operation, Schema, ToolContract};
use std::collections::BTreeMap;

/// Apply `agent` on top of `online` and return the merged contract.
pub fn merge_agent_tool(mut online: ToolContract, agent: &ToolContract) -> ToolContract {
    online.version = agent.version.clone();
    online.method = agent.method.clone();
    online.sub_url = agent.sub_url.clone();
    merge_operation(&mut online.operation, &agent.operation);
    online
}

fn merge_operation(dest: &mut Operation, src: &Operation) {
    if dest.parameters.is_empty() || src.parameters.is_empty() {
        dest.parameters = src.parameters.clone();
    } else {
        for param in dest.parameters.iter_mut() {
            if let Some(custom) = src.parameters.iter().find(|p| p.name == param.name) {
                merge_overrides(&mut param.schema, &custom.schema);
            }
        }
    }

    match (dest.request_body.as_mut(), src.request_body.as_ref()) {
        (Some(dest_body), Some(src_body)) => {
            merge_content(&mut dest_body.content, &src_body.content);
        }
        _ => dest.request_body = src.request_body.clone(),
    }

    if dest.responses.is_empty() || src.responses.is_empty() {
        dest.responses = src.responses.clone();
    } else {
        for (code, response) in dest.responses.iter_mut() {
            if let Some(custom) = src.responses.get(code) {
                merge_content(&mut response.content, &custom.content);
            }
        }
    }
}

fn merge_content(
    dest: &mut BTreeMap<String, MediaContent>,
    src: &BTreeMap<String, MediaContent>,
) {
    for (media, content) in dest.iter_mut() {
        if let Some(custom) = src.get(media) {
            merge_schema(&mut content.schema, &custom.schema);
        }
    }
}

fn merge_schema(dest: &mut Schema, src: &Schema) {
    merge_overrides(dest, src);

    for (name, prop) in dest.properties.iter_mut() {
        if let Some(custom) = src.properties.get(name) {
            merge_schema(prop, custom);
        }
    }
    if let (Some(items), Some(custom)) = (dest.items.as_mut(), src.items.as_ref()) {
        merge_schema(items, custom);
    }
}

/// The three agent-tunable fields.
fn merge_overrides(dest: &mut Schema, src: &Schema) {
    dest.local_disable = src.local_disable;
    if src.variable_ref.is_some() {
        dest.variable_ref = src.variable_ref.clone();
    }
    dest.default = src.default.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ParameterSpec, RequestBody};
    use crate::types::ParamLocation;
    use serde_json::json;

    fn tool(params: Vec<ParameterSpec>, body: Option<Schema>) -> ToolContract {
        ToolContract {
            id: 7,
            plugin_id: 3,
            name: "search".into(),
            version: Some("v1".into()),
            method: "POST".into(),
            sub_url: "/search".into(),
            activated: true,
            operation: Operation {
                parameters: params,
                request_body: body.map(|schema| RequestBody {
                    required: false,
                    content: [("application/json".to_string(), MediaContent { schema })]
                        .into_iter()
                        .collect(),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn agent_defaults_and_flags_override_online() {
        let online = tool(
            vec![
                ParameterSpec::new("q", ParamLocation::Query, Schema::string()),
                ParameterSpec::new("lang", ParamLocation::Query, Schema::string()),
            ],
            Some(Schema::object([(
                "filter",
                Schema::object([("region", Schema::string())]),
            )])),
        );

        let mut hidden = Schema::string().with_default(json!("en"));
        hidden.local_disable = true;
        let mut agent = tool(
            vec![ParameterSpec::new("lang", ParamLocation::Query, hidden)],
            Some(Schema::object([(
                "filter",
                Schema::object([("region", Schema::string().with_variable_ref("home_region"))]),
            )])),
        );
        agent.version = Some("v2".into());

        let merged = merge_agent_tool(online, &agent);
        assert_eq!(merged.version.as_deref(), Some("v2"));
        assert_eq!(merged.operation.parameters.len(), 2);

        let lang = &merged.operation.parameters[1].schema;
        assert!(lang.local_disable);
        assert_eq!(lang.default, Some(json!("en")));

        let (_, body) = merged.operation.request_body.as_ref().unwrap().select().unwrap();
        let region = &body.properties["filter"].properties["region"];
        assert_eq!(region.variable_ref.as_deref(), Some("home_region"));
    }

    #[test]
    fn empty_side_takes_agent_parameters() {
        let online = tool(vec![], None);
        let agent = tool(
            vec![ParameterSpec::new("q", ParamLocation::Query, Schema::string())],
            None,
        );
        let merged = merge_agent_tool(online, &agent);
        assert_eq!(merged.operation.parameters.len(), 1);
    }
}
