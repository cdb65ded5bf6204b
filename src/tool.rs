//! The closed set of editing tools and their static configuration.

use std::fmt;
use std::str::FromStr;

/// An editing or generation tool the user can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Free-text edit of the current image.
    Prompt,
    /// Remove a described object from the current image.
    RemoveObject,
    /// Generate a brand new image from text.
    GenerateImage,
    /// Generate a short video from text, optionally seeded by the current image.
    GenerateVideo,
    /// Restore the original colors of the current image.
    Restore,
    /// Remove the background of the current image.
    RemoveBackground,
}

/// How a tool sources its instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// The user must supply free text; the placeholder hints at what.
    FreeText { placeholder: &'static str },
    /// The tool always sends the same fixed instruction.
    Fixed { instruction: &'static str },
}

/// Static configuration for a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolConfig {
    /// Display label.
    pub label: &'static str,
    /// Where the instruction text comes from.
    pub prompt_mode: PromptMode,
}

impl Tool {
    /// All tools, in the order they are presented.
    pub const ALL: [Tool; 6] = [
        Tool::Prompt,
        Tool::RemoveObject,
        Tool::GenerateImage,
        Tool::GenerateVideo,
        Tool::Restore,
        Tool::RemoveBackground,
    ];

    /// Returns the static configuration for this tool.
    pub fn config(&self) -> ToolConfig {
        match self {
            Tool::Prompt => ToolConfig {
                label: "AI Prompt",
                prompt_mode: PromptMode::FreeText {
                    placeholder: "e.g., make the sky dramatic",
                },
            },
            Tool::RemoveObject => ToolConfig {
                label: "Remove Object",
                prompt_mode: PromptMode::FreeText {
                    placeholder: "e.g., the person in the red shirt",
                },
            },
            Tool::GenerateImage => ToolConfig {
                label: "Generate Image",
                prompt_mode: PromptMode::FreeText {
                    placeholder: "e.g., a cat astronaut on Mars",
                },
            },
            Tool::GenerateVideo => ToolConfig {
                label: "Generate Video",
                prompt_mode: PromptMode::FreeText {
                    placeholder: "e.g., a drone shot of a city",
                },
            },
            Tool::Restore => ToolConfig {
                label: "Restore Color",
                prompt_mode: PromptMode::Fixed {
                    instruction: "restore the original color, preserving all text and details",
                },
            },
            Tool::RemoveBackground => ToolConfig {
                label: "Remove BG",
                prompt_mode: PromptMode::Fixed {
                    instruction: "remove the background",
                },
            },
        }
    }

    /// Returns true if the tool requires free-text input from the user.
    pub fn needs_prompt(&self) -> bool {
        matches!(self.config().prompt_mode, PromptMode::FreeText { .. })
    }

    /// Returns true if the tool edits the current image in place
    /// (as opposed to generating fresh content).
    pub fn is_image_edit(&self) -> bool {
        matches!(
            self,
            Tool::Prompt | Tool::RemoveObject | Tool::Restore | Tool::RemoveBackground
        )
    }

    /// Returns the CLI name for this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Prompt => "prompt",
            Tool::RemoveObject => "remove-object",
            Tool::GenerateImage => "generate-image",
            Tool::GenerateVideo => "generate-video",
            Tool::Restore => "restore",
            Tool::RemoveBackground => "remove-bg",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Tool::Prompt),
            "remove-object" => Ok(Tool::RemoveObject),
            "generate-image" => Ok(Tool::GenerateImage),
            "generate-video" => Ok(Tool::GenerateVideo),
            "restore" => Ok(Tool::Restore),
            "remove-bg" => Ok(Tool::RemoveBackground),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}
