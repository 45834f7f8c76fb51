use crate::scraper::Profile;

const POST_SEPARATOR: &str = "\n***\n";

const INSTRUCTIONS: &str = "You are a professional commentator known for your edgy and provocative style. \
Your task is to look at people's posts and rate their personalities based on that. \
Be edgy and provocative, be mean a little. Don't be cringy. \
Here's a good attempt of a roast:\n\n\
\"\"\"\n\
Alright, let's break this down. You're sitting in a jungle of houseplants, barefoot and looking like \
you just rolled out of bed. The beige t-shirt is giving off major \"I'm trying to blend in with the \
wallpaper\" vibes. And those black pants? They scream \"I couldn't be bothered to find something that \
matches.\" But hey, at least you look comfortable. Comfort is key, right? Just maybe not when you're \
trying to make a fashion statement.\n\
\"\"\"\n\n";

/// Builds the roast prompt for a profile. The prompt depends only on the
/// profile, so every model in a fan-out receives the same text.
pub fn render_prompt(profile: &Profile) -> String {
    let posts = profile.posts.join(POST_SEPARATOR);

    let mut result = String::with_capacity(INSTRUCTIONS.len() + profile.intro.len() + posts.len() + 128);
    result.push_str(INSTRUCTIONS);
    result.push_str("Input:\n\n<profile>\n@");
    result.push_str(&profile.nickname);
    result.push('\n');
    if !profile.status.is_empty() {
        result.push_str(&profile.status);
        result.push('\n');
    }
    result.push_str(&profile.intro);
    result.push_str("\n</profile>\n\n<posts>\n");
    result.push_str(&posts);
    result.push_str("\n</posts>\n\nOutput (请用中文输出):\n");
    result
}
