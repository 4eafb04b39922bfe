use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};

use crate::{
    commands::*,
    errors::BotError,
    handlers::{inline_query_received, link_received},
};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the start message.")]
    Start,
    #[command(description = "show this help.")]
    Help,
}

pub fn schema() -> UpdateHandler<BotError> {
    use dptree::case;

    let commands = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Help].endpoint(help));

    dptree::entry()
        .branch(
            // Filter for messages
            Update::filter_message()
                .branch(commands)
                // Post links and ids
                .branch(Message::filter_text().endpoint(link_received)),
        )
        .branch(Update::filter_inline_query().endpoint(inline_query_received))
}
