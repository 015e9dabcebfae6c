use dioxus::prelude::*;
use tracing_subscriber::EnvFilter;

use api::SessionState;
use views::{Feed, Login, NewPost, PostDetail, Register, Services, SessionGate};

mod views;

const TAILWIND_CSS: Asset = asset!("/assets/tailwind.css");

#[derive(Debug, Clone, Routable, PartialEq)]
#[rustfmt::skip]
enum Route {
    #[layout(SessionGate)]
        #[route("/")]
        Feed {},
        #[route("/new")]
        NewPost {},
        #[route("/posts/:id")]
        PostDetail { id: String },
        #[route("/login")]
        Login {},
        #[route("/register")]
        Register {},
}

impl Route {
    /// Screens that only make sense without a session.
    fn is_public(&self) -> bool {
        matches!(self, Route::Login {} | Route::Register {})
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The launcher may have installed a subscriber already.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let services = use_context_provider(Services::start);
    let mut session_state = use_context_provider(|| Signal::new(services.session.state()));

    let session = services.session.clone();
    use_future(move || {
        let mut changes = session.changes();
        async move {
            while changes.changed().await.is_ok() {
                let state: SessionState = changes.borrow_and_update().clone();
                session_state.set(state);
            }
        }
    });

    let provider = services.provider.clone();
    use_drop(move || provider.borrow_mut().shutdown());

    rsx! {
        document::Link { rel: "stylesheet", href: TAILWIND_CSS }
        Router::<Route> {}
    }
}
