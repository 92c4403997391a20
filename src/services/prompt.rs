use crate::models::{PromptVersion, Section};

/// Builds the instruction sent with every image. The section headings are
/// the contract `ResponseParser` reads back.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    version: PromptVersion,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptVersion::CURRENT)
    }
}

impl PromptBuilder {
    pub fn new(version: PromptVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> PromptVersion {
        self.version
    }

    pub fn build(&self) -> String {
        match self.version {
            PromptVersion::V1 => build_v1(),
        }
    }
}

fn section_hint(section: Section) -> &'static str {
    match section {
        Section::MedicineName => "brand and generic name with strength, e.g. Ibuprofen 200 mg",
        Section::SafetyRating => "a single number from 0 to 10, written as X/10",
        Section::SideEffects => "one side effect per line, each starting with \"- \"",
        Section::RecentStudies => "one study or finding per line, each starting with \"- \"",
        Section::Recommendations => "a short paragraph on dosage and usage",
        Section::UserStories => "one short user experience per line, each starting with \"- \"",
        Section::Alternatives => "one alternative medicine per line, each starting with \"- \"",
        Section::PriceRange => "typical price range with currency",
        Section::Availability => "prescription status and where it can be bought",
    }
}

fn build_v1() -> String {
    let mut prompt = String::from(
        "You are a pharmacist assistant. Look carefully at this photo of a medicine package.\n\
         Identify the medicine and give a safety and usage analysis.\n\
         \n\
         ANSWER FORMAT (use exactly these nine headings, in this order, \
         each on its own line followed by a colon):\n",
    );

    for (i, section) in Section::ALL.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: [{}]\n", i + 1, section.title(), section_hint(*section)));
    }

    prompt.push_str(
        "\n\
         If you cannot determine a section, keep the heading and write \"Unknown\".\n\
         Do not add any other headings. This is an informational aid, not medical advice.",
    );

    prompt
}
