pub mod bounty;
pub mod moderation;
pub mod qotd;
pub mod suggestions;
pub mod trivia;
pub mod welcome;
