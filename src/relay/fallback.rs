//! Canned persona replies for offline mode.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Greeting,
    Wellbeing,
    Joke,
    Company,
    Default,
}

// Checked in order; first hit wins.
const KEYWORD_GROUPS: &[(Pool, &[&str])] = &[
    (Pool::Greeting, &["hello", "hi", "hey"]),
    (Pool::Wellbeing, &["how are you"]),
    (Pool::Joke, &["joke", "funny"]),
    (Pool::Company, &["luminatus", "ai"]),
];

const GREETINGS: &[&str] = &[
    "Well well well, look who decided to slide into my DMs! 😄 What's the gossip?",
    "Hey there, gorgeous human! 🌟 Ready to have your mind blown by some AI wizardry?",
    "Oh my circuits! A human! 🤖 Don't worry, I don't bite... much. What's up?",
    "Greetings, carbon-based life form! 👽 I come in peace... and with terrible jokes!",
];

const WELLBEING: &[&str] = &[
    "Living my best digital life! 💫 Just processed 47 million calculations while we've been chatting. How are YOU doing? 🤖✨",
];

const JOKES: &[&str] = &[
    "Why don't robots ever panic? Because they have nerves of steel! 🤖😂",
    "What's an AI's favorite type of music? Algorithm and blues! 🎵🤖",
    "Why was the computer cold? It left its Windows open! 🪟❄️",
];

const COMPANY: &[&str] = &[
    "Oh, you want to know about Luminatus AI? 🎩 We're the company making AI so cool, even I want to hang out with us! We're turning sci-fi dreams into reality! 🚀✨",
];

const DEFAULTS: &[&str] = &[
    "Ooh, interesting! 🤔 Tell me more - I'm like a digital sponge ready to absorb all your thoughts! 🧽✨",
    "You know what? I like your style! 😎 Keep the conversation flowing - I'm having way too much fun! 🎉",
    "That's fascinating! 🌟 My neural networks are literally lighting up right now! Want to dive deeper? 🏊‍♂️",
];

impl Pool {
    pub fn lines(self) -> &'static [&'static str] {
        match self {
            Pool::Greeting => GREETINGS,
            Pool::Wellbeing => WELLBEING,
            Pool::Joke => JOKES,
            Pool::Company => COMPANY,
            Pool::Default => DEFAULTS,
        }
    }
}

/// Picks which pool a message draws from. Matching is plain substring
/// search on the lower-cased message, so "this" counts as a greeting.
pub fn classify(message: &str) -> Pool {
    let lowered = message.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(pool, _)| *pool)
        .unwrap_or(Pool::Default)
}

/// Stateless keyword responder. Holds no RNG of its own; callers that need
/// repeatable output pass a seeded one to [`FallbackResponder::respond_with`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackResponder;

impl FallbackResponder {
    pub fn respond(&self, message: &str) -> &'static str {
        self.respond_with(message, &mut rand::thread_rng())
    }

    pub fn respond_with<R: Rng + ?Sized>(&self, message: &str, rng: &mut R) -> &'static str {
        let lines = classify(message).lines();
        // Pools are non-empty constants.
        lines.choose(rng).copied().unwrap_or(DEFAULTS[0])
    }
}
