//! Line -> `Command`.
//!
//! Pure text parsing: whitespace is trimmed and collapsed, keywords and
//! aliases match case-insensitively, and a bare digit 1-9 becomes a
//! dialogue choice. Anything malformed comes back as `Invalid` with a
//! usage hint; an unrecognized first word is `Unknown`.

use crate::types::{Direction, ItemSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Noop,
    Unknown(String),
    Invalid { hint: String },

    // Movement / UI
    Move(Direction),
    Look,
    LookDir(Direction),
    Exits,
    Who,
    Score,
    Inventory,
    Equipment,
    Help,
    Quit,
    Prompt(Option<String>),
    Recall,

    // Communication
    Say(String),
    Tell { to: String, message: String },
    Gossip(String),
    Whisper { to: String, message: String },
    Shout(String),
    Ooc(String),
    Pose(String),

    // Items
    Get(String),
    GetFrom { item: String, container: String },
    Drop(String),
    Give { item: String, to: String },
    Use(String),
    Wear(String),
    Remove(ItemSlot),

    // Shop / economy
    ShopList,
    Buy(String),
    Sell(String),
    Balance,

    // Dialogue
    Talk(String),
    DialogueChoice(u8),

    // Combat / progression
    Kill(String),
    Flee,
    Cast { spell: String, target: Option<String> },
    Spells,
    Effects,
    Dispel(String),

    // World features
    Open(String),
    Close(String),
    Unlock(String),
    Search(String),
    PutIn { item: String, container: String },
    Pull(String),
    Read(String),

    // Groups / guilds / mail
    Group(GroupCommand),
    GroupTell(String),
    Guild(GuildCommand),
    GuildChat(String),
    Mail(MailCommand),

    // Staff
    Admin(AdminCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCommand {
    Invite(String),
    Accept,
    Decline,
    Leave,
    Kick(String),
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuildCommand {
    Create { name: String, tag: String },
    Invite(String),
    Accept,
    Leave,
    Kick(String),
    Promote(String),
    Demote(String),
    Disband,
    Motd(Option<String>),
    Roster,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailCommand {
    List,
    Read(usize),
    Delete(usize),
    Send(String),
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Goto(String),
    Transfer { name: String, room: String },
    Spawn(String),
    Shutdown,
    Smite(String),
    Kick(String),
    SetLevel { name: String, level: u32 },
    Phase(Option<String>),
}

fn invalid(hint: &str) -> Command {
    Command::Invalid {
        hint: hint.to_string(),
    }
}

/// Join tokens from `from` onward with single spaces.
fn rest(tokens: &[&str], from: usize) -> String {
    tokens[from.min(tokens.len())..].join(" ")
}

/// A one-argument command: `Some(arg)` or `None` when missing.
fn one_arg(tokens: &[&str]) -> Option<String> {
    (tokens.len() >= 2).then(|| rest(tokens, 1))
}

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Noop;
    }

    // Apostrophe say: 'hello there
    if let Some(after) = trimmed.strip_prefix('\'') {
        let message = after.split_whitespace().collect::<Vec<_>>().join(" ");
        return if message.is_empty() {
            invalid("Say what?")
        } else {
            Command::Say(message)
        };
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let keyword = tokens[0].to_lowercase();

    // Bare digits: 1-9 select a dialogue choice, anything else is noise.
    if keyword.chars().all(|c| c.is_ascii_digit()) {
        if tokens.len() == 1 {
            if let Ok(n @ 1..=9) = keyword.parse::<u8>() {
                return Command::DialogueChoice(n);
            }
        }
        return Command::Unknown(trimmed.to_string());
    }

    if let Some(dir) = Direction::parse(&keyword) {
        return Command::Move(dir);
    }

    match keyword.as_str() {
        "look" | "l" => match tokens.get(1).and_then(|t| Direction::parse(&t.to_lowercase())) {
            Some(dir) => Command::LookDir(dir),
            None if tokens.len() > 1 => invalid("Usage: look [direction]"),
            None => Command::Look,
        },
        "exits" | "ex" => Command::Exits,
        "who" => Command::Who,
        "score" => Command::Score,
        "inventory" | "i" | "inv" => Command::Inventory,
        "equipment" | "eq" => Command::Equipment,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "recall" => Command::Recall,
        "prompt" => Command::Prompt(one_arg(&tokens)),

        "say" => match one_arg(&tokens) {
            Some(message) => Command::Say(message),
            None => invalid("Say what?"),
        },
        "tell" | "t" => {
            if tokens.len() < 3 {
                return invalid("Usage: tell <name> <message>");
            }
            Command::Tell {
                to: tokens[1].to_string(),
                message: rest(&tokens, 2),
            }
        }
        "whisper" | "wh" => {
            if tokens.len() < 3 {
                return invalid("Usage: whisper <name> <message>");
            }
            Command::Whisper {
                to: tokens[1].to_string(),
                message: rest(&tokens, 2),
            }
        }
        "gossip" | "gs" => match one_arg(&tokens) {
            Some(message) => Command::Gossip(message),
            None => invalid("Gossip what?"),
        },
        "shout" | "sh" => match one_arg(&tokens) {
            Some(message) => Command::Shout(message),
            None => invalid("Shout what?"),
        },
        "ooc" => match one_arg(&tokens) {
            Some(message) => Command::Ooc(message),
            None => invalid("Usage: ooc <message>"),
        },
        "pose" | "po" => match one_arg(&tokens) {
            Some(text) => Command::Pose(text),
            None => invalid("Pose what?"),
        },

        "get" | "take" => {
            // `get <item> from <container>` splits at the last "from".
            if let Some(at) = tokens.iter().rposition(|t| t.eq_ignore_ascii_case("from")) {
                if at >= 2 && at + 1 < tokens.len() {
                    return Command::GetFrom {
                        item: tokens[1..at].join(" "),
                        container: rest(&tokens, at + 1),
                    };
                }
            }
            match one_arg(&tokens) {
                Some(item) => Command::Get(item),
                None => invalid("Get what?"),
            }
        }
        "pickup" => match one_arg(&tokens) {
            Some(item) => Command::Get(item),
            None => invalid("Get what?"),
        },
        "pick" => {
            // `pick up <item>` or plain `pick <item>`.
            let from = if tokens.get(1).map(|t| t.eq_ignore_ascii_case("up")) == Some(true) {
                2
            } else {
                1
            };
            let item = rest(&tokens, from);
            if item.is_empty() {
                invalid("Get what?")
            } else {
                Command::Get(item)
            }
        }
        "drop" => match one_arg(&tokens) {
            Some(item) => Command::Drop(item),
            None => invalid("Drop what?"),
        },
        "give" => {
            if tokens.len() < 3 {
                return invalid("Usage: give <item> <player>");
            }
            Command::Give {
                item: tokens[1..tokens.len() - 1].join(" "),
                to: tokens[tokens.len() - 1].to_string(),
            }
        }
        "use" => match one_arg(&tokens) {
            Some(item) => Command::Use(item),
            None => invalid("Use what?"),
        },
        "wear" | "equip" => match one_arg(&tokens) {
            Some(item) => Command::Wear(item),
            None => invalid("Wear what?"),
        },
        "remove" | "unequip" => match tokens.get(1) {
            Some(word) => match ItemSlot::parse(&word.to_lowercase()) {
                Some(slot) => Command::Remove(slot),
                None => invalid("Usage: remove <head|chest|legs|feet|hands|weapon|shield>"),
            },
            None => invalid("Remove what?"),
        },

        "list" | "shop" => Command::ShopList,
        "buy" | "purchase" => match one_arg(&tokens) {
            Some(item) => Command::Buy(item),
            None => invalid("Buy what?"),
        },
        "sell" => match one_arg(&tokens) {
            Some(item) => Command::Sell(item),
            None => invalid("Sell what?"),
        },
        "balance" | "gold" | "wealth" => Command::Balance,

        "talk" => match one_arg(&tokens) {
            Some(npc) => Command::Talk(npc),
            None => invalid("Talk to whom?"),
        },

        "kill" | "attack" => match one_arg(&tokens) {
            Some(target) => Command::Kill(target),
            None => invalid("Kill what?"),
        },
        "flee" => Command::Flee,
        "cast" | "c" => {
            if tokens.len() < 2 {
                return invalid("Usage: cast <spell> [target]");
            }
            Command::Cast {
                spell: tokens[1].to_lowercase(),
                target: (tokens.len() > 2).then(|| rest(&tokens, 2)),
            }
        }
        "spells" | "abilities" => Command::Spells,
        "effects" | "buffs" | "debuffs" => Command::Effects,
        "dispel" => match one_arg(&tokens) {
            Some(name) => Command::Dispel(name),
            None => invalid("Dispel what?"),
        },

        "open" => match one_arg(&tokens) {
            Some(feature) => Command::Open(feature),
            None => invalid("Open what?"),
        },
        "close" => match one_arg(&tokens) {
            Some(feature) => Command::Close(feature),
            None => invalid("Close what?"),
        },
        "unlock" => match one_arg(&tokens) {
            Some(feature) => Command::Unlock(feature),
            None => invalid("Unlock what?"),
        },
        "search" => match one_arg(&tokens) {
            Some(container) => Command::Search(container),
            None => invalid("Search what?"),
        },
        "put" => {
            if let Some(at) = tokens.iter().rposition(|t| t.eq_ignore_ascii_case("in")) {
                if at >= 2 && at + 1 < tokens.len() {
                    return Command::PutIn {
                        item: tokens[1..at].join(" "),
                        container: rest(&tokens, at + 1),
                    };
                }
            }
            invalid("Usage: put <item> in <container>")
        }
        "pull" => match one_arg(&tokens) {
            Some(lever) => Command::Pull(lever),
            None => invalid("Pull what?"),
        },
        "read" => match one_arg(&tokens) {
            Some(sign) => Command::Read(sign),
            None => invalid("Read what?"),
        },

        "group" => parse_group(&tokens),
        "gtell" | "gt" => match one_arg(&tokens) {
            Some(message) => Command::GroupTell(message),
            None => invalid("Tell your group what?"),
        },
        "guild" => parse_guild(&tokens),
        "gchat" => match one_arg(&tokens) {
            Some(message) => Command::GuildChat(message),
            None => invalid("Tell your guild what?"),
        },
        "mail" => parse_mail(&tokens),

        "goto" => match one_arg(&tokens) {
            Some(room) => Command::Admin(AdminCommand::Goto(room)),
            None => invalid("Usage: goto <zone:room>"),
        },
        "transfer" => {
            if tokens.len() != 3 {
                return invalid("Usage: transfer <name> <zone:room>");
            }
            Command::Admin(AdminCommand::Transfer {
                name: tokens[1].to_string(),
                room: tokens[2].to_string(),
            })
        }
        "spawn" => match one_arg(&tokens) {
            Some(template) => Command::Admin(AdminCommand::Spawn(template)),
            None => invalid("Usage: spawn <template>"),
        },
        "shutdown" => Command::Admin(AdminCommand::Shutdown),
        "smite" => match one_arg(&tokens) {
            Some(target) => Command::Admin(AdminCommand::Smite(target)),
            None => invalid("Smite whom?"),
        },
        "kick" => match one_arg(&tokens) {
            Some(name) => Command::Admin(AdminCommand::Kick(name)),
            None => invalid("Kick whom?"),
        },
        "setlevel" => {
            if tokens.len() != 3 {
                return invalid("Usage: setlevel <name> <level>");
            }
            match tokens[2].parse::<u32>() {
                Ok(level) => Command::Admin(AdminCommand::SetLevel {
                    name: tokens[1].to_string(),
                    level,
                }),
                Err(_) => invalid("Usage: setlevel <name> <level>"),
            }
        }
        "phase" | "layer" => Command::Admin(AdminCommand::Phase(one_arg(&tokens))),

        _ => Command::Unknown(trimmed.to_string()),
    }
}

fn parse_group(tokens: &[&str]) -> Command {
    let usage = "Usage: group invite <name> | accept | decline | leave | kick <name> | list";
    let Some(sub) = tokens.get(1) else {
        return invalid(usage);
    };
    match sub.to_lowercase().as_str() {
        "invite" | "inv" => match tokens.get(2) {
            Some(name) => Command::Group(GroupCommand::Invite(name.to_string())),
            None => invalid("Invite whom?"),
        },
        "accept" | "acc" => Command::Group(GroupCommand::Accept),
        "decline" => Command::Group(GroupCommand::Decline),
        "leave" => Command::Group(GroupCommand::Leave),
        "kick" => match tokens.get(2) {
            Some(name) => Command::Group(GroupCommand::Kick(name.to_string())),
            None => invalid("Kick whom?"),
        },
        "list" => Command::Group(GroupCommand::List),
        _ => invalid(usage),
    }
}

fn parse_guild(tokens: &[&str]) -> Command {
    let usage = "Usage: guild create <tag> <name> | invite <name> | accept | leave | kick <name> \
                 | promote <name> | demote <name> | disband | motd [text] | roster | info";
    let Some(sub) = tokens.get(1) else {
        return invalid(usage);
    };
    match sub.to_lowercase().as_str() {
        "create" => {
            if tokens.len() < 4 {
                return invalid("Usage: guild create <tag> <name>");
            }
            Command::Guild(GuildCommand::Create {
                tag: tokens[2].to_string(),
                name: rest(tokens, 3),
            })
        }
        "invite" => match tokens.get(2) {
            Some(name) => Command::Guild(GuildCommand::Invite(name.to_string())),
            None => invalid("Invite whom?"),
        },
        "accept" => Command::Guild(GuildCommand::Accept),
        "leave" => Command::Guild(GuildCommand::Leave),
        "kick" => match tokens.get(2) {
            Some(name) => Command::Guild(GuildCommand::Kick(name.to_string())),
            None => invalid("Kick whom?"),
        },
        "promote" => match tokens.get(2) {
            Some(name) => Command::Guild(GuildCommand::Promote(name.to_string())),
            None => invalid("Promote whom?"),
        },
        "demote" => match tokens.get(2) {
            Some(name) => Command::Guild(GuildCommand::Demote(name.to_string())),
            None => invalid("Demote whom?"),
        },
        "disband" => Command::Guild(GuildCommand::Disband),
        "motd" => Command::Guild(GuildCommand::Motd(
            (tokens.len() > 2).then(|| rest(tokens, 2)),
        )),
        "roster" => Command::Guild(GuildCommand::Roster),
        "info" => Command::Guild(GuildCommand::Info),
        _ => invalid(usage),
    }
}

fn parse_mail(tokens: &[&str]) -> Command {
    let usage = "Usage: mail list | read <n> | delete <n> | send <name> | abort";
    let Some(sub) = tokens.get(1) else {
        return invalid(usage);
    };
    match sub.to_lowercase().as_str() {
        "list" => Command::Mail(MailCommand::List),
        "read" => match tokens.get(2).and_then(|t| t.parse::<usize>().ok()) {
            Some(n) if n >= 1 => Command::Mail(MailCommand::Read(n)),
            _ => invalid("Usage: mail read <n>"),
        },
        "delete" => match tokens.get(2).and_then(|t| t.parse::<usize>().ok()) {
            Some(n) if n >= 1 => Command::Mail(MailCommand::Delete(n)),
            _ => invalid("Usage: mail delete <n>"),
        },
        "send" => match tokens.get(2) {
            Some(name) => Command::Mail(MailCommand::Send(name.to_string())),
            None => invalid("Send mail to whom?"),
        },
        "abort" => Command::Mail(MailCommand::Abort),
        _ => invalid(usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_noops() {
        assert_eq!(parse(""), Command::Noop);
        assert_eq!(parse("   \t "), Command::Noop);
    }

    #[test]
    fn movement_short_and_long_forms() {
        assert_eq!(parse("n"), Command::Move(Direction::North));
        assert_eq!(parse("SOUTH"), Command::Move(Direction::South));
        assert_eq!(parse("  u  "), Command::Move(Direction::Up));
    }

    #[test]
    fn look_with_and_without_direction() {
        assert_eq!(parse("look"), Command::Look);
        assert_eq!(parse("l"), Command::Look);
        assert_eq!(parse("look n"), Command::LookDir(Direction::North));
        assert_eq!(parse("l east"), Command::LookDir(Direction::East));
        assert!(matches!(parse("look sideways"), Command::Invalid { .. }));
    }

    #[test]
    fn apostrophe_say() {
        assert_eq!(parse("'hello there"), Command::Say("hello there".into()));
        assert_eq!(parse("'  spaced   out "), Command::Say("spaced out".into()));
        assert!(matches!(parse("'"), Command::Invalid { .. }));
    }

    #[test]
    fn whitespace_is_collapsed_in_messages() {
        assert_eq!(
            parse("say   hello    world"),
            Command::Say("hello world".into())
        );
    }

    #[test]
    fn tell_requires_name_and_message() {
        assert_eq!(
            parse("tell Bob hi there"),
            Command::Tell {
                to: "Bob".into(),
                message: "hi there".into()
            }
        );
        assert!(matches!(parse("tell Bob"), Command::Invalid { .. }));
        assert_eq!(
            parse("t bob hi"),
            Command::Tell {
                to: "bob".into(),
                message: "hi".into()
            }
        );
    }

    #[test]
    fn bare_digits_route_to_dialogue() {
        assert_eq!(parse("1"), Command::DialogueChoice(1));
        assert_eq!(parse(" 9 "), Command::DialogueChoice(9));
        assert_eq!(parse("0"), Command::Unknown("0".into()));
        assert_eq!(parse("10"), Command::Unknown("10".into()));
        assert_eq!(parse("42"), Command::Unknown("42".into()));
    }

    #[test]
    fn cast_is_not_shadowed_by_bare_c() {
        assert!(matches!(parse("c"), Command::Invalid { .. }));
        assert_eq!(
            parse("c ember rat"),
            Command::Cast {
                spell: "ember".into(),
                target: Some("rat".into())
            }
        );
        assert_eq!(
            parse("cast mend"),
            Command::Cast {
                spell: "mend".into(),
                target: None
            }
        );
    }

    #[test]
    fn item_commands() {
        assert_eq!(parse("get cap"), Command::Get("cap".into()));
        assert_eq!(parse("take cap"), Command::Get("cap".into()));
        assert_eq!(parse("pickup cap"), Command::Get("cap".into()));
        assert_eq!(parse("pick cap"), Command::Get("cap".into()));
        assert_eq!(parse("pick up cap"), Command::Get("cap".into()));
        assert_eq!(parse("drop cap"), Command::Drop("cap".into()));
        assert_eq!(parse("wear cap"), Command::Wear("cap".into()));
        assert_eq!(parse("equip cap"), Command::Wear("cap".into()));
        assert_eq!(parse("remove head"), Command::Remove(ItemSlot::Head));
        assert!(matches!(parse("remove hat"), Command::Invalid { .. }));
        assert!(matches!(parse("get"), Command::Invalid { .. }));
    }

    #[test]
    fn give_takes_last_token_as_target() {
        assert_eq!(
            parse("give rusty key Bob"),
            Command::Give {
                item: "rusty key".into(),
                to: "Bob".into()
            }
        );
        assert!(matches!(parse("give coin"), Command::Invalid { .. }));
    }

    #[test]
    fn container_commands_split_on_keywords() {
        assert_eq!(
            parse("get cap from crate"),
            Command::GetFrom {
                item: "cap".into(),
                container: "crate".into()
            }
        );
        assert_eq!(
            parse("put rusty key in crate"),
            Command::PutIn {
                item: "rusty key".into(),
                container: "crate".into()
            }
        );
        assert!(matches!(parse("put key"), Command::Invalid { .. }));
    }

    #[test]
    fn shop_commands() {
        assert_eq!(parse("list"), Command::ShopList);
        assert_eq!(parse("shop"), Command::ShopList);
        assert_eq!(parse("buy sword"), Command::Buy("sword".into()));
        assert_eq!(parse("purchase sword"), Command::Buy("sword".into()));
        assert_eq!(parse("sell sword"), Command::Sell("sword".into()));
        assert_eq!(parse("gold"), Command::Balance);
    }

    #[test]
    fn group_subcommands() {
        assert_eq!(
            parse("group invite Bob"),
            Command::Group(GroupCommand::Invite("Bob".into()))
        );
        assert_eq!(parse("group inv Bob"), Command::Group(GroupCommand::Invite("Bob".into())));
        assert_eq!(parse("group acc"), Command::Group(GroupCommand::Accept));
        assert_eq!(parse("group decline"), Command::Group(GroupCommand::Decline));
        assert_eq!(parse("group list"), Command::Group(GroupCommand::List));
        assert!(matches!(parse("group"), Command::Invalid { .. }));
        assert_eq!(parse("gt onward"), Command::GroupTell("onward".into()));
    }

    #[test]
    fn guild_subcommands() {
        assert_eq!(
            parse("guild create ROSE Order of the Rose"),
            Command::Guild(GuildCommand::Create {
                tag: "ROSE".into(),
                name: "Order of the Rose".into()
            })
        );
        assert_eq!(
            parse("guild promote Bob"),
            Command::Guild(GuildCommand::Promote("Bob".into()))
        );
        assert_eq!(
            parse("guild motd Rally at dawn"),
            Command::Guild(GuildCommand::Motd(Some("Rally at dawn".into())))
        );
        assert_eq!(parse("guild motd"), Command::Guild(GuildCommand::Motd(None)));
        assert_eq!(parse("gchat hello"), Command::GuildChat("hello".into()));
    }

    #[test]
    fn mail_subcommands() {
        assert_eq!(parse("mail list"), Command::Mail(MailCommand::List));
        assert_eq!(parse("mail read 2"), Command::Mail(MailCommand::Read(2)));
        assert_eq!(parse("mail delete 1"), Command::Mail(MailCommand::Delete(1)));
        assert_eq!(
            parse("mail send Bob"),
            Command::Mail(MailCommand::Send("Bob".into()))
        );
        assert_eq!(parse("mail abort"), Command::Mail(MailCommand::Abort));
        assert!(matches!(parse("mail read zero"), Command::Invalid { .. }));
        assert!(matches!(parse("mail read 0"), Command::Invalid { .. }));
        assert!(matches!(parse("mail"), Command::Invalid { .. }));
    }

    #[test]
    fn admin_commands() {
        assert_eq!(
            parse("goto town:square"),
            Command::Admin(AdminCommand::Goto("town:square".into()))
        );
        assert_eq!(
            parse("transfer Bob wilds:road"),
            Command::Admin(AdminCommand::Transfer {
                name: "Bob".into(),
                room: "wilds:road".into()
            })
        );
        assert_eq!(
            parse("setlevel Bob 10"),
            Command::Admin(AdminCommand::SetLevel {
                name: "Bob".into(),
                level: 10
            })
        );
        assert!(matches!(parse("setlevel Bob ten"), Command::Invalid { .. }));
        assert_eq!(parse("phase"), Command::Admin(AdminCommand::Phase(None)));
        assert_eq!(
            parse("layer e2"),
            Command::Admin(AdminCommand::Phase(Some("e2".into())))
        );
        assert_eq!(parse("shutdown"), Command::Admin(AdminCommand::Shutdown));
    }

    #[test]
    fn unknown_words_keep_the_raw_line() {
        assert_eq!(parse("dance wildly"), Command::Unknown("dance wildly".into()));
    }
}
