//! Canned inputs for pipeline tests

#![allow(dead_code)]

/// Model output for scenario A, including the instruction artifacts and
/// boilerplate the generator has to strip.
pub const SPACE_SCRIPT: &str = "[/INST] Here is the script: You won't believe what's out there! \
    A day on Venus lasts longer than its entire year. Neutron stars are so dense that a teaspoon \
    would weigh billions of tons. Saturn could float in a bathtub big enough to hold it. \
    Footprints on the Moon will stay there for millions of years.\n\n\
    Follow for more cosmic facts! </s>";

/// Sentences in [`SPACE_SCRIPT`] after cleaning.
pub const SPACE_SCRIPT_SENTENCES: usize = 6;

/// A submission the API accepts.
#[derive(Debug, Clone)]
pub struct TopicFixture {
    pub topic: &'static str,
    pub duration: i32,
    pub description: &'static str,
}

pub const TOPICS: &[TopicFixture] = &[
    TopicFixture {
        topic: "10 Amazing Facts About Space",
        duration: 60,
        description: "default duration",
    },
    TopicFixture {
        topic: "Why cats knock things off tables",
        duration: 30,
        description: "shortest duration",
    },
    TopicFixture {
        topic: "The history of the printing press",
        duration: 180,
        description: "longest duration",
    },
];
