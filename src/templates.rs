//! Rubric prompts, embedded in the binary and rendered with tera
use rust_embed::Embed;
use tera::{Context, Tera};

#[derive(Embed)]
#[folder = "src/judges/prompts"]
struct Prompts;

pub struct Templates;

impl Templates {
    pub fn from_file(name: &str) -> Result<String, tera::Error> {
        Prompts::get(name)
            .map(|file| String::from_utf8_lossy(&file.data).into_owned())
            .ok_or_else(|| tera::Error::msg(format!("Template `{name}` does not exist")))
    }

    pub fn render(name: &str, context: &Context) -> Result<String, tera::Error> {
        let template = Self::from_file(name)?;
        Tera::one_off(&template, context, false)
    }
}
