use std::rc::Rc;

use dioxus::prelude::*;

use api::{CredentialGateway, FeedLoader, FeedState, Notice, Post};

use super::{use_services, NoticeBanner};
use crate::Route;

#[component]
pub fn Feed() -> Element {
    let services = use_services();
    let loader = use_hook(|| Rc::new(FeedLoader::new(services.backend.clone())));
    let mut feed = use_signal(FeedState::default);
    let mut notice = use_signal(|| Option::<Notice>::None);
    let mut refresh = use_signal(|| 0u32);

    let _loader = use_resource(move || {
        let loader = loader.clone();
        let _ = refresh();
        async move {
            loader.load_posts().await;
            feed.set(loader.state());
            notice.set(loader.last_error().map(|e| e.notice()));
        }
    });

    let handle_sign_out = move |_| {
        let gateway = CredentialGateway::new(services.backend.clone());
        spawn(async move {
            if let Err(e) = gateway.sign_out().await {
                notice.set(Some(e.notice()));
            }
        });
    };

    let body = match feed() {
        FeedState::NotLoaded => rsx! {
            p { class: "text-neutral-600", "Loading..." }
        },
        FeedState::Loaded(posts) if posts.is_empty() => rsx! {
            p { class: "text-neutral-600", "No posts yet. Be the first to share something!" }
        },
        FeedState::Loaded(posts) => rsx! {
            for post in posts {
                PostCard { key: "{post.id}", post: post.clone() }
            }
        },
    };

    rsx! {
        div {
            class: "max-w-3xl mx-auto w-full px-6 py-8",
            div {
                class: "flex items-center justify-between mb-6",
                h1 { class: "text-[2rem] font-bold text-neutral-800 m-0", "Feed" }
                div {
                    class: "flex gap-2",
                    button {
                        class: "px-3 py-1.5 rounded-md border border-neutral-300",
                        onclick: move |_| refresh += 1,
                        "Refresh"
                    }
                    Link {
                        class: "px-3 py-1.5 rounded-md bg-neutral-800 text-white",
                        to: Route::NewPost {},
                        "New post"
                    }
                    button {
                        class: "px-3 py-1.5 rounded-md border border-neutral-300",
                        onclick: handle_sign_out,
                        "Sign out"
                    }
                }
            }
            NoticeBanner { notice: notice() }
            {body}
        }
    }
}

#[component]
fn PostCard(post: Post) -> Element {
    let created = post.created_label();
    rsx! {
        Link {
            class: "block mb-4 p-4 rounded-md border border-neutral-300 no-underline",
            to: Route::PostDetail { id: post.id.clone() },
            h2 { class: "m-0 mb-1 text-lg font-semibold text-neutral-800", "{post.title}" }
            if !created.is_empty() {
                p { class: "m-0 mb-2 text-xs text-neutral-500", "{created}" }
            }
            p { class: "m-0 text-neutral-700", "{post.content}" }
            if let Some(url) = post.image_url.clone() {
                img { class: "mt-3 w-full rounded-md", src: "{url}" }
            }
        }
    }
}
