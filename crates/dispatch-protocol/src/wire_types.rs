//! Field names and fixed values of the JSON envelope.
//!
//! Every frame is one JSON object. Requests carry `action` and
//! `requestId` plus action-specific fields; responses echo both and add
//! `success` with either a payload key or `error`.

pub const ACTION: &str = "action";
pub const REQUEST_ID: &str = "requestId";
pub const SUCCESS: &str = "success";
pub const ERROR: &str = "error";
pub const BROADCAST: &str = "broadcast";

/// Nested parameter block used by caption and thumbnail requests.
pub const PARAMS: &str = "params";
pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";

pub const QUERY: &str = "query";
pub const SEARCH_COUNT: &str = "searchCount";
pub const ATTEMPT_COUNT: &str = "attemptCount";

pub const VIDEO_PROMPT_PREFIX: &str = "video_prompt_prefix";
pub const OPTIONS: &str = "options";

/// Chat topic id keys, in lookup order.
pub const TOPIC_ID_KEYS: [&str; 2] = ["videoId", "topicId"];
pub const USERNAME: &str = "username";
pub const CONTENT: &str = "content";

/// Action echoed when a frame could not be parsed far enough to read one.
pub const UNKNOWN_ACTION: &str = "unknown";

// Success payload keys.
pub const CAPTION: &str = "caption";
pub const THUMBNAIL_URL: &str = "thumbnailUrl";
pub const RESULT: &str = "result";
pub const VIDEO: &str = "video";
pub const MESSAGES: &str = "messages";
pub const MESSAGE: &str = "message";
