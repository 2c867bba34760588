use crate::models::{Comment, CommentView, NewComment, Subject, ThreadNode};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register_subject,
        crate::routes::list_thread,
        crate::routes::add_comment,
        crate::routes::delete_comment,
        crate::routes::pin_comment,
        crate::routes::unpin_comment,
        crate::routes::like_comment,
        crate::routes::unlike_comment,
    ),
    components(schemas(
        Subject, Comment, NewComment, CommentView, ThreadNode,
        crate::routes::RegisterSubjectRequest, crate::routes::AddCommentRequest
    )),
    tags(
        (name = "subjects", description = "Subject registration and thread reads"),
        (name = "comments", description = "Comment, pin and like operations"),
    )
)]
pub struct ApiDoc;
