use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;

use api::{Notice, Session, SessionProvider};
use store::{AppBackend, MemoryMedia, PostboardConfig};

mod feed;
pub use feed::Feed;

mod login;
pub use login::{Login, Register};

mod new_post;
pub use new_post::NewPost;

mod post_detail;
pub use post_detail::PostDetail;

mod session_gate;
pub use session_gate::SessionGate;

/// Backends and the session, shared by every screen.
#[derive(Clone)]
pub struct Services {
    pub backend: AppBackend,
    pub media: MemoryMedia,
    pub config: PostboardConfig,
    pub session: Session,
    pub provider: Rc<RefCell<SessionProvider>>,
}

impl Services {
    pub fn start() -> Self {
        let config = load_config();
        let backend = AppBackend::from_config(&config);
        let provider = SessionProvider::start(&backend);
        Self {
            session: provider.session(),
            provider: Rc::new(RefCell::new(provider)),
            media: MemoryMedia::new(),
            backend,
            config,
        }
    }
}

fn load_config() -> PostboardConfig {
    let path = PostboardConfig::filename();
    match std::fs::read_to_string(path) {
        Ok(text) => PostboardConfig::from_toml(&text).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid {}: {}", path, e);
            PostboardConfig::default()
        }),
        Err(_) => PostboardConfig::default(),
    }
}

pub(crate) fn use_services() -> Services {
    use_context::<Services>()
}

#[component]
pub(crate) fn NoticeBanner(notice: Option<Notice>) -> Element {
    rsx! {
        if let Some(notice) = notice {
            div {
                class: "rounded-md border border-neutral-300 bg-neutral-50 px-3 py-2 mb-4",
                p { class: "m-0 font-semibold text-neutral-800", "{notice.title}" }
                p { class: "m-0 text-sm text-neutral-600", "{notice.message}" }
            }
        }
    }
}
