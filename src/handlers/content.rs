use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::store::{NewPage, SalonStore};
use super::caller_tenant;
use crate::mcp::registry::{
    parse_params, roles, to_result, CommandScope, CommandSpec, Handler, HandlerError,
    HandlerResult,
};
use crate::mcp::CommandContext;

const CONTENT_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        "content_pages_list",
        "content",
        "read",
        roles::EVERYONE,
        CommandScope::Collection,
        "List site pages",
    ),
    CommandSpec::new(
        "content_page_create",
        "content",
        "create",
        roles::MANAGEMENT,
        CommandScope::Collection,
        "Create a site page",
    ),
    CommandSpec::new(
        "content_blog_posts_list",
        "blog",
        "read",
        roles::EVERYONE,
        CommandScope::Collection,
        "List blog posts",
    ),
];

pub struct ContentHandler {
    store: Arc<SalonStore>,
}

impl ContentHandler {
    pub fn new(store: Arc<SalonStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for ContentHandler {
    fn namespace(&self) -> &'static str {
        "content"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        CONTENT_COMMANDS
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "content_pages_list" => {
                // Drafts are only visible to those who can edit them.
                let drafts = ctx.role().can_manage_content();
                let pages: Vec<_> = self
                    .store
                    .list_pages()
                    .into_iter()
                    .filter(|p| p.published || drafts)
                    .collect();
                to_result(&pages)
            }
            "content_page_create" => {
                let new: NewPage = parse_params(params)?;
                let page = self.store.create_page(new, caller_tenant(ctx))?;
                self.store.audit(ctx.user_id(), method, &page.id);
                to_result(&page)
            }
            "content_blog_posts_list" => to_result(&self.store.list_blog_posts()),
            other => Err(HandlerError::Failed(format!(
                "content handler cannot execute {}",
                other
            ))),
        }
    }
}
