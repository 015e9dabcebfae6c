use std::rc::Rc;

use dioxus::prelude::*;

use api::{pick_image, LocalImage, Notice, PostForm, PostSubmission};
use store::PickOptions;

use super::{use_services, NoticeBanner};
use crate::Route;

#[component]
pub fn NewPost() -> Element {
    let services = use_services();
    let nav = use_navigator();
    let submission = use_hook(|| {
        Rc::new(PostSubmission::new(
            services.backend.clone(),
            services.media.clone(),
            services.session.clone(),
            &services.config,
        ))
    });

    let mut title = use_signal(String::new);
    let mut content = use_signal(String::new);
    let mut image = use_signal(|| Option::<LocalImage>::None);
    let mut submitting = use_signal(|| false);
    let mut notice = use_signal(|| Option::<Notice>::None);

    let media = services.media.clone();
    let options = PickOptions::from(&services.config.picker);
    let handle_pick = move |evt: FormEvent| {
        let media = media.clone();
        let options = options.clone();
        spawn(async move {
            // The file input hands over the bytes; the picker returns them.
            let Some(engine) = evt.files() else { return };
            let Some(name) = engine.files().into_iter().next() else { return };
            let Some(bytes) = engine.read_file(&name).await else {
                tracing::warn!("Could not read picked file {}", name);
                return;
            };
            media.stage(format!("file:///picked/{name}"), bytes);
            match pick_image(&media, &options).await {
                Ok(Some(picked)) => image.set(Some(picked)),
                Ok(None) => {}
                Err(e) => notice.set(Some(e.notice())),
            }
        });
    };

    let handle_submit = move |_| {
        let submission = submission.clone();
        spawn(async move {
            let mut form = PostForm {
                title: title(),
                content: content(),
                image: image(),
            };
            submitting.set(true);
            let result = submission.submit_post(&mut form).await;
            submitting.set(false);
            match result {
                Ok(_) => {
                    title.set(form.title);
                    content.set(form.content);
                    image.set(form.image);
                    nav.push(Route::Feed {});
                }
                Err(e) => notice.set(Some(e.notice())),
            }
        });
    };

    rsx! {
        div {
            class: "max-w-3xl mx-auto w-full px-6 py-8",
            h1 { class: "text-[2rem] font-bold text-neutral-800 m-0 mb-8", "New post" }

            NoticeBanner { notice: notice() }

            input {
                class: "w-full mb-3 px-3 py-2 border border-neutral-300 rounded-md",
                r#type: "text",
                placeholder: "Title",
                value: "{title}",
                oninput: move |evt: FormEvent| title.set(evt.value()),
            }
            textarea {
                class: "w-full mb-3 px-3 py-2 border border-neutral-300 rounded-md min-h-32",
                placeholder: "What's on your mind?",
                value: "{content}",
                oninput: move |evt: FormEvent| content.set(evt.value()),
            }

            div {
                class: "flex items-center gap-3 mb-6",
                label {
                    class: "px-3 py-1.5 rounded-md border border-neutral-300 cursor-pointer",
                    "Choose image"
                    input {
                        class: "hidden",
                        r#type: "file",
                        accept: "image/*",
                        onchange: handle_pick,
                    }
                }
                if let Some(picked) = image() {
                    span { class: "text-sm text-neutral-600 truncate", "{picked.uri}" }
                    button {
                        class: "text-sm text-neutral-600",
                        onclick: move |_| image.set(None),
                        "Remove"
                    }
                }
            }

            button {
                class: "w-full py-2 rounded-md bg-neutral-800 text-white disabled:opacity-50",
                disabled: submitting(),
                onclick: handle_submit,
                if submitting() { "Publishing..." } else { "Publish" }
            }
        }
    }
}
