use crate::models::{Message, NewNotice, NewUser, Notice, Thread, ThreadSummary, User};
use crate::routes::{ComposeMessage, DeleteThreads, ThreadIds};
use crate::service::Receipt;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::compose_message,
        crate::routes::inbox,
        crate::routes::unread_count,
        crate::routes::get_thread,
        crate::routes::delete_threads,
        crate::routes::send_notice,
        crate::routes::active_notice,
        crate::routes::create_user,
    ),
    components(schemas(
        Message, Thread, ThreadSummary, Notice, NewNotice, User, NewUser,
        Receipt, ComposeMessage, DeleteThreads, ThreadIds
    )),
    tags(
        (name = "messages", description = "Compose operations"),
        (name = "threads", description = "Thread queries and deletion"),
        (name = "notices", description = "Sitewide notices"),
    )
)]
pub struct ApiDoc;
