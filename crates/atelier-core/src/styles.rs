//! Built-in style catalog
//!
//! Each style is a LoRA adapter for the Kontext image models plus the word
//! that activates it in a prompt.

use serde::Serialize;

/// A selectable image style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleModel {
    /// Stable id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Preview image served by the UI
    pub image_src: &'static str,
    /// Word that must appear verbatim in the prompt
    pub trigger_word: &'static str,
    /// LoRA weights URL
    pub lora_url: &'static str,
}

macro_rules! kontext_style {
    ($id:literal, $name:literal, $trigger:literal, $weights:literal) => {
        StyleModel {
            id: $id,
            name: $name,
            image_src: concat!("/images/styles/", $id, ".png"),
            trigger_word: $trigger,
            lora_url: concat!(
                "https://huggingface.co/Owen777/Kontext-Style-Loras/resolve/main/",
                $weights
            ),
        }
    };
}

/// Every built-in style, in display order
pub const STYLES: &[StyleModel] = &[
    kontext_style!("pixel", "Pixel Style", "Pixel style", "Pixel_lora_weights.safetensors"),
    kontext_style!("snoopy", "Snoopy Style", "Snoopy style", "Snoopy_lora_weights.safetensors"),
    kontext_style!("jojo", "JoJo Style", "JoJo style", "Jojo_lora_weights.safetensors"),
    kontext_style!("clay", "Clay Style", "Clay style", "Clay_Toy_lora_weights.safetensors"),
    kontext_style!("ghibli", "Ghibli Style", "Ghibli style", "Ghibli_lora_weights.safetensors"),
    kontext_style!(
        "americancartoon",
        "American Cartoon Style",
        "American Cartoon style",
        "American_Cartoon_lora_weights.safetensors"
    ),
    kontext_style!("lego", "Lego Style", "Lego style", "LEGO_lora_weights.safetensors"),
    StyleModel {
        id: "plushie",
        name: "Plushie Style",
        image_src: "/images/styles/plushie.png",
        trigger_word: "Plushie style",
        lora_url: "https://huggingface.co/fal/Plushie-Kontext-Dev-LoRA/resolve/main/plushie-kontext-dev-lora.safetensors",
    },
    StyleModel {
        id: "wojak",
        name: "Wojak Style",
        image_src: "/images/styles/wojack.jpg",
        trigger_word: "Wojak style",
        lora_url: "https://huggingface.co/fal/Wojak-Kontext-Dev-LoRA/resolve/main/wojak-kontext-dev-lora.safetensors",
    },
];

/// Look up a style by id
#[must_use]
pub fn find_style(id: &str) -> Option<&'static StyleModel> {
    STYLES.iter().find(|s| s.id == id)
}
