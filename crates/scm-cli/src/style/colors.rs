//! Semantic color palette for terminal output, matching the teacher's
//! `kimberlite-cli::style::colors` one for one.

use owo_colors::{OwoColorize, Style};

pub fn success_style() -> Style {
    Style::new().green().bold()
}

pub fn error_style() -> Style {
    Style::new().red().bold()
}

pub fn warning_style() -> Style {
    Style::new().yellow()
}

pub fn muted_style() -> Style {
    Style::new().dimmed()
}

pub fn code_style() -> Style {
    Style::new().blue()
}

/// Trait extension to apply semantic styles.
pub trait SemanticStyle: Sized {
    fn success(&self) -> String;
    fn error(&self) -> String;
    fn warning(&self) -> String;
    fn muted(&self) -> String;
    fn code(&self) -> String;
}

impl<T: std::fmt::Display> SemanticStyle for T {
    fn success(&self) -> String {
        if super::no_color() { self.to_string() } else { self.style(success_style()).to_string() }
    }

    fn error(&self) -> String {
        if super::no_color() { self.to_string() } else { self.style(error_style()).to_string() }
    }

    fn warning(&self) -> String {
        if super::no_color() { self.to_string() } else { self.style(warning_style()).to_string() }
    }

    fn muted(&self) -> String {
        if super::no_color() { self.to_string() } else { self.style(muted_style()).to_string() }
    }

    fn code(&self) -> String {
        if super::no_color() { self.to_string() } else { self.style(code_style()).to_string() }
    }
}
