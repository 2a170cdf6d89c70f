use owo_colors::{OwoColorize, Style};

/// Visual role of a piece of output.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tone {
    Heading,
    Good,
    Bad,
    Dim,
    Emphasis,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Heading => Style::new().bold().cyan(),
            Self::Good => Style::new().bold().green(),
            Self::Bad => Style::new().bold().yellow(),
            Self::Dim => Style::new().dimmed(),
            Self::Emphasis => Style::new().bold(),
        }
    }
}

/// Styles terminal text, or passes it through when colour is off.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, text: impl AsRef<str>, tone: Tone) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_string()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(text, Tone::Heading)
    }

    pub(crate) fn dim(&self, text: impl AsRef<str>) -> String {
        self.paint(text, Tone::Dim)
    }

    pub(crate) fn emphasis(&self, text: impl AsRef<str>) -> String {
        self.paint(text, Tone::Emphasis)
    }
}
