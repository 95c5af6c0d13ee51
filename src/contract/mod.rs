//! Tool and plugin contracts, as loaded from the catalog.

pub mod merge;
pub mod plugin;
pub mod schema;
pub mod tool;

pub use merge::merge_agent_tool;
pub use plugin::{
    AuthorizationCodeConfig, ClientCredentialsConfig, CommonParam, CommonParams, OAuthAuth,
    PluginAuth, PluginInfo, ServiceTokenAuth, ServiceTokenLocation,
};
pub use schema::Schema;
pub use tool::{MediaContent, Operation, ParameterSpec, RequestBody, ResponseBody, ToolContract};
