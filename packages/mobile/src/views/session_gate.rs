use dioxus::prelude::*;

use api::{ScreenSet, SessionState};

use crate::Route;

/// Mounts either the signed-in or the signed-out screens, never both.
#[component]
pub fn SessionGate() -> Element {
    let session = use_context::<Signal<SessionState>>();
    let route = use_route::<Route>();
    let nav = use_navigator();

    let target = match session().screen_set() {
        ScreenSet::Splash => {
            return rsx! {
                div { class: "flex-1 flex items-center justify-center" }
            };
        }
        ScreenSet::Authenticated if route.is_public() => Some(Route::Feed {}),
        ScreenSet::Unauthenticated if !route.is_public() => Some(Route::Login {}),
        _ => None,
    };

    if let Some(target) = target {
        nav.replace(target);
        return rsx! {};
    }

    rsx! {
        div {
            class: "flex flex-col min-h-screen",
            Outlet::<Route> {}
        }
    }
}
