use teloxide::prelude::*;

use crate::errors::HandlerResult;

pub async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Type my username followed by tags in any chat to search the archive, \
         or send me a post link and I'll send the media here.",
    )
    .await?;
    Ok(())
}
