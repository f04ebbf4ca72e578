pub mod client;
pub mod http;

pub use client::{
    ChatMessage, Choice, ChoiceMessage, InferenceClient, InferenceError, InferenceResponse,
    MockInference,
};
pub use http::HttpInference;
