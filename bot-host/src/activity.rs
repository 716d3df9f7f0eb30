use serde::{Deserialize, Serialize};

/// Subset of the channel activity schema the host needs to route a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub from: Option<ChannelAccount>,
    #[serde(default)]
    pub recipient: Option<ChannelAccount>,
    #[serde(default)]
    pub conversation: Option<ConversationAccount>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub members_added: Vec<ChannelAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

impl Activity {
    /// Bounded label for metrics; unknown activity types collapse to `other`.
    pub fn kind(&self) -> &'static str {
        match self.activity_type.as_str() {
            "message" => "message",
            "conversationUpdate" => "conversationUpdate",
            "invoke" => "invoke",
            "event" => "event",
            _ => "other",
        }
    }

    /// Members added to the conversation other than the bot itself.
    pub fn joined_members(&self) -> impl Iterator<Item = &ChannelAccount> {
        let bot_id = self.recipient.as_ref().map(|account| account.id.as_str());
        self.members_added
            .iter()
            .filter(move |member| Some(member.id.as_str()) != bot_id)
    }
}
