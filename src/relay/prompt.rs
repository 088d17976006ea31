use super::{Speaker, Turn};

pub const PERSONA_PREAMBLE: &str = "You are Appu, Luminatus AI's witty assistant. \
Be funny, use emojis, make tech jokes. Keep it short (1-2 sentences max).
Luminatus AI builds custom AI solutions: machine learning, natural language processing, \
computer vision and AI strategy consulting for businesses of every size.";

pub const REPLY_CUE: &str = "Appu's witty response:";

fn label(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => "User",
        Speaker::Assistant => "Appu",
    }
}

/// The trailing `window` turns, oldest first.
pub fn trailing_window(history: &[Turn], window: usize) -> &[Turn] {
    &history[history.len().saturating_sub(window)..]
}

/// Renders the full prompt document for one request.
pub fn build_prompt(history: &[Turn], message: &str, window: usize) -> String {
    let recent = trailing_window(history, window);

    let mut prompt = String::with_capacity(
        PERSONA_PREAMBLE.len()
            + REPLY_CUE.len()
            + message.len()
            + recent.iter().map(|t| t.text.len() + 8).sum::<usize>()
            + 32,
    );

    prompt.push_str(PERSONA_PREAMBLE);
    prompt.push_str("\n\n");

    if !recent.is_empty() {
        for turn in recent {
            prompt.push_str(label(turn.speaker));
            prompt.push_str(": ");
            prompt.push_str(&turn.text);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("{}: \"{}\"\n\n", label(Speaker::User), message));
    prompt.push_str(REPLY_CUE);
    prompt
}
