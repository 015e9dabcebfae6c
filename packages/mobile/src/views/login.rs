use dioxus::prelude::*;

use api::{CredentialGateway, Notice};

use super::{use_services, NoticeBanner};
use crate::Route;

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    SignIn,
    SignUp,
}

#[component]
pub fn Login() -> Element {
    rsx! { CredentialsForm { mode: Mode::SignIn } }
}

#[component]
pub fn Register() -> Element {
    rsx! { CredentialsForm { mode: Mode::SignUp } }
}

#[component]
fn CredentialsForm(mode: Mode) -> Element {
    let services = use_services();
    let mut email = use_signal(String::new);
    let mut password = use_signal(String::new);
    let mut busy = use_signal(|| false);
    let mut notice = use_signal(|| Option::<Notice>::None);

    let handle_submit = move |_| {
        let gateway = CredentialGateway::new(services.backend.clone());
        spawn(async move {
            busy.set(true);
            let result = match mode {
                Mode::SignIn => gateway.sign_in(&email(), &password()).await,
                Mode::SignUp => gateway.sign_up(&email(), &password()).await,
            };
            busy.set(false);
            match result {
                Ok(ack) => notice.set(Some(ack)),
                Err(e) => notice.set(Some(e.notice())),
            }
        });
    };

    let (heading, action, switch_label, switch_to) = match mode {
        Mode::SignIn => ("Sign in", "Sign in", "Create an account", Route::Register {}),
        Mode::SignUp => ("Register", "Register", "I already have an account", Route::Login {}),
    };

    rsx! {
        div {
            class: "max-w-sm mx-auto w-full px-6 py-12",
            h1 { class: "text-[2rem] font-bold text-neutral-800 m-0 mb-8", "{heading}" }

            NoticeBanner { notice: notice() }

            input {
                class: "w-full mb-3 px-3 py-2 border border-neutral-300 rounded-md",
                r#type: "email",
                placeholder: "Email",
                value: "{email}",
                oninput: move |evt: FormEvent| email.set(evt.value()),
            }
            input {
                class: "w-full mb-6 px-3 py-2 border border-neutral-300 rounded-md",
                r#type: "password",
                placeholder: "Password",
                value: "{password}",
                oninput: move |evt: FormEvent| password.set(evt.value()),
            }
            button {
                class: "w-full py-2 rounded-md bg-neutral-800 text-white disabled:opacity-50",
                disabled: busy(),
                onclick: handle_submit,
                if busy() { "Please wait..." } else { "{action}" }
            }
            Link {
                class: "block mt-4 text-center text-sm text-neutral-600",
                to: switch_to,
                "{switch_label}"
            }
        }
    }
}
