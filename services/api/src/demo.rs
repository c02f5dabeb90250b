use chrono::{Duration, Utc};
use clap::Args;
use estate_moderation::error::AppError;
use estate_moderation::moderation::{
    AccessContext, ConversationType, MemoryStore, Message, MessageStore, ModerationService,
    ModerationSettings, NewReport, ReportQuery, ReportUpdate, Role, Session, UserAccount, UserId,
};
use std::sync::Arc;

const DEMO_ADMIN: &str = "admin-1";
const DEMO_BUYER: &str = "buyer-1";
const DEMO_AGENT: &str = "agent-1";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the report portion of the demo.
    #[arg(long)]
    pub(crate) skip_reports: bool,
    /// Print the final report queue as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { skip_reports, json } = args;

    let store = Arc::new(MemoryStore::with_users([
        UserAccount::new(DEMO_ADMIN, "Support Desk", Role::Admin),
        UserAccount::new(DEMO_BUYER, "Dana Buyer", Role::User),
        UserAccount::new(DEMO_AGENT, "Lee Agent", Role::User),
    ]));
    let service = ModerationService::new(
        store.clone(),
        ModerationSettings {
            support_admin_id: Some(UserId::new(DEMO_ADMIN)),
            ..ModerationSettings::default()
        },
    );

    let admin = Session::new(DEMO_ADMIN, Role::Admin);
    let buyer = Session::new(DEMO_BUYER, Role::User);
    let admin_id = UserId::new(DEMO_ADMIN);
    let buyer_id = UserId::new(DEMO_BUYER);
    let agent_id = UserId::new(DEMO_AGENT);
    let context = AccessContext {
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("estate-moderation demo".to_string()),
    };

    println!("Support case demo");
    service.send_message(&buyer, &admin_id, "The agent keeps asking for a cash deposit.")?;
    let reply = service.send_message(&admin, &buyer_id, "Thanks, we are looking into it.")?;
    println!(
        "- Buyer opened a support thread ({}), case {}",
        reply.conversation_type.label(),
        reply
            .case_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("none")
    );

    let closure = service.close_case(&admin, &buyer_id, &context)?;
    println!(
        "- Admin closed the case: {} message(s) closed{}",
        closure.closed_messages,
        if closure.partial { " (partial)" } else { "" }
    );

    let status = service.conversation_status(&buyer, &admin_id, "user_to_admin")?;
    println!(
        "- Buyer sees closed={} ({})",
        status.is_closed,
        status.message.as_deref().unwrap_or("no notice")
    );

    service.send_message(&buyer, &admin_id, "One more detail: they called again today.")?;
    let status = service.conversation_status(&buyer, &admin_id, "user_to_admin")?;
    println!("- Buyer wrote again, case reopened: closed={}", status.is_closed);

    let legacy = Message::new(
        admin_id.clone(),
        buyer_id.clone(),
        "Legacy follow-up from the old inbox",
        ConversationType::AdminToUser,
        Utc::now() - Duration::days(30),
    );
    store.insert_message(legacy)?;
    let summary = service.run_corrector()?;
    println!(
        "- Corrector relabelled {} legacy message(s); a second pass fixes {}",
        summary.total(),
        service.run_corrector()?.total()
    );

    for conversation in service.conversations(&buyer, None)? {
        println!(
            "- Inbox: {} message(s) with {} ({}, {} unread)",
            conversation.message_count,
            conversation.counterpart_id,
            conversation.conversation_type.label(),
            conversation.unread_count
        );
    }

    if skip_reports {
        return Ok(());
    }

    println!("\nReport demo");
    let report = service.create_report(
        &buyer,
        NewReport {
            reported_user_id: agent_id.clone(),
            reason: "fraud".to_string(),
            description: Some("Asked for a wire transfer before any viewing.".to_string()),
        },
    )?;
    println!("- Buyer filed report {} against {}", report.id, agent_id);

    match service.create_report(
        &buyer,
        NewReport {
            reported_user_id: agent_id.clone(),
            reason: "spam".to_string(),
            description: None,
        },
    ) {
        Ok(_) => println!("- Second report unexpectedly accepted"),
        Err(err) => println!("- Second report rejected: {err}"),
    }

    let resolved = service.update_report(
        &admin,
        &report.id,
        ReportUpdate {
            status: Some("resolved".to_string()),
            resolution_notes: Some("Listing removed and agent warned.".to_string()),
            assign_to_me: true,
        },
        &context,
    )?;
    println!(
        "- Admin resolved the report (status {}, resolved_at set: {})",
        resolved.status.label(),
        resolved.resolved_at.is_some()
    );

    let listing = service.list_reports(&admin, ReportQuery::default(), &context)?;
    println!(
        "- Queue: {} total, {} pending, {} resolved",
        listing.counts.total, listing.counts.pending, listing.counts.resolved
    );

    if json {
        match serde_json::to_string_pretty(&listing) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("  Report listing unavailable: {err}"),
        }
    }

    Ok(())
}
