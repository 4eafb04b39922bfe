use teloxide::{prelude::*, utils::command::BotCommands};

use crate::{errors::HandlerResult, schema::Command};

pub async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}
