use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;

use api::{
    CommentDraft, CommentSubmission, DetailEvent, DetailPhase, DetailSnapshot, Notice, PostDetailSync,
};

use super::{use_services, NoticeBanner};

#[component]
pub fn PostDetail(id: String) -> Element {
    let services = use_services();
    let nav = use_navigator();
    let (sync, events) = use_hook(|| {
        let (sync, events) = PostDetailSync::new(services.backend.clone());
        (Rc::new(RefCell::new(sync)), Rc::new(RefCell::new(Some(events))))
    });
    let comments = use_hook(|| {
        Rc::new(CommentSubmission::new(
            services.backend.clone(),
            services.session.clone(),
        ))
    });

    let mut snapshot = use_signal(DetailSnapshot::default);
    let mut notice = use_signal(|| Option::<Notice>::None);
    let mut draft = use_signal(String::new);
    let mut sending = use_signal(|| false);

    // Follow the route parameter; mounting the same id again is a no-op.
    if sync.borrow().post_id() != Some(id.as_str()) {
        sync.borrow_mut().mount(&id);
    }

    let watched = sync.clone();
    use_future(move || {
        let mut rx = watched.borrow().watch();
        async move {
            snapshot.set(rx.borrow_and_update().clone());
            while rx.changed().await.is_ok() {
                snapshot.set(rx.borrow_and_update().clone());
            }
        }
    });

    use_future(move || {
        let events = events.borrow_mut().take();
        async move {
            let Some(mut events) = events else { return };
            while let Some(event) = events.recv().await {
                match event {
                    DetailEvent::NavigateBack => nav.go_back(),
                    DetailEvent::Alert(alert) => notice.set(Some(alert)),
                }
            }
        }
    });

    let mounted = sync.clone();
    use_drop(move || mounted.borrow_mut().unmount());

    let post_id = id.clone();
    let handle_send = move |_| {
        let comments = comments.clone();
        let post_id = post_id.clone();
        spawn(async move {
            let mut pending = CommentDraft::new(draft());
            sending.set(true);
            let result = comments.submit_comment(&post_id, &mut pending).await;
            sending.set(false);
            match result {
                Ok(_) => draft.set(pending.text),
                Err(e) => notice.set(Some(e.notice())),
            }
        });
    };

    let current = snapshot();
    let body = match (&current.phase, &current.post) {
        (DetailPhase::NotFound, _) => rsx! {
            p { class: "text-neutral-600", "This post no longer exists." }
        },
        (DetailPhase::Error(message), None) => rsx! {
            p { class: "text-red-600", "{message}" }
        },
        (DetailPhase::Idle | DetailPhase::Loading, _) | (_, None) => rsx! {
            p { class: "text-neutral-600", "Loading..." }
        },
        (_, Some(post)) => rsx! {
            h1 { class: "text-[2rem] font-bold text-neutral-800 m-0 mb-1", "{post.title}" }
            p { class: "m-0 mb-4 text-xs text-neutral-500", {post.created_label()} }
            if let Some(url) = post.image_url.clone() {
                img { class: "mb-4 w-full rounded-md", src: "{url}" }
            }
            p { class: "m-0 mb-8 text-neutral-700 whitespace-pre-wrap", "{post.content}" }

            h2 { class: "text-lg font-semibold text-neutral-800 m-0 mb-4 pb-2 border-b border-neutral-300", "Comments" }
            if let Some(err) = current.comment_error.clone() {
                p { class: "text-sm text-red-600", "{err}" }
            }
            for comment in current.comments.iter() {
                div {
                    key: "{comment.id}",
                    class: "mb-3",
                    p { class: "m-0 text-neutral-800", "{comment.content}" }
                    p { class: "m-0 text-xs text-neutral-500", {comment.created_label()} }
                }
            }
            div {
                class: "flex gap-2 mt-4",
                input {
                    class: "flex-1 px-3 py-2 border border-neutral-300 rounded-md",
                    r#type: "text",
                    placeholder: "Add a comment",
                    value: "{draft}",
                    oninput: move |evt: FormEvent| draft.set(evt.value()),
                }
                button {
                    class: "px-3 py-2 rounded-md bg-neutral-800 text-white disabled:opacity-50",
                    disabled: sending(),
                    onclick: handle_send,
                    "Send"
                }
            }
        },
    };

    rsx! {
        div {
            class: "max-w-3xl mx-auto w-full px-6 py-8",
            NoticeBanner { notice: notice() }
            {body}
        }
    }
}
