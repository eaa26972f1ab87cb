//! Prompts sent alongside the inline clip, and the fallbacks used when the
//! model replies with nothing.

/// Scene description for a clip from a rear camera held by a visually
/// impaired user. Hazards first, then objects closest to furthest.
pub const SCENE_PROMPT: &str = "\
You are VisionAlly. Analyze this video and audio (if present) from a smartphone back camera held by a visually impaired user.

**PRIORITY ORDER:**
1. **IMMEDIATE DANGER**: Start with 'WARNING:' if you see hazards (cars, red lights, holes). THIS COMES FIRST.
2. **Proximity Scan**: Identify objects from CLOSEST to FURTHEST. e.g., 'Directly in front is a chair (2 steps). Behind that is a table (5 steps).'
3. **Environment**: Briefly describe the scene and sounds.
4. **Text**: Read visible text.

Keep it concise. Speak naturally.";

/// Reply used when the model returns no text for a scene description.
pub const EMPTY_ANALYSIS_REPLY: &str = "I couldn't analyze the video.";

/// Reply used when the model returns no text for a follow-up question.
pub const EMPTY_ANSWER_REPLY: &str = "I couldn't find an answer in the video.";

/// Follow-up prompt asking about the clip that was just described.
///
/// ```
/// use visionally::analysis::question_prompt;
///
/// let prompt = question_prompt("what colour is the door?");
/// assert!(prompt.contains("User Question: \"what colour is the door?\""));
/// ```
pub fn question_prompt(question: &str) -> String {
    format!(
        "You are VisionAlly. The user is asking a specific question about the video you just analyzed. \n\n\
         User Question: \"{question}\"\n\n\
         Answer the question directly, concisely, and helpfully based on the visual evidence in the video. Speak naturally."
    )
}
