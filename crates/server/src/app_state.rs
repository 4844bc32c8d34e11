use server_api::ApiContext;

use crate::auth::TokenConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) tokens: TokenConfig,
    pub(crate) default_page_size: u32,
}
