//! Today's entry: post, edit, visibility, delete and the local draft.

use clap::{Args, Subcommand};
use daybook_core::{ChipKind, CoreError, EntryFields, ProofChip, Visibility};

use super::{print_json, Context};

#[derive(Args, Debug, Default)]
pub struct EntryArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub reflection: Option<String>,
    #[arg(long)]
    pub goal: Option<String>,
    /// Bullet point (repeatable, max 5)
    #[arg(long = "bullet")]
    pub bullets: Vec<String>,
    /// Proof chip as KIND:VALUE or KIND:LABEL:VALUE (repeatable, max 4)
    #[arg(long = "chip", value_parser = parse_chip)]
    pub chips: Vec<ProofChip>,
    /// everyone, friends or only-me
    #[arg(long)]
    pub visibility: Option<Visibility>,
}

impl EntryArgs {
    /// Overlay the given flags on `base`; list flags replace the whole list.
    fn apply(self, mut base: EntryFields) -> EntryFields {
        if self.title.is_some() {
            base.title = self.title;
        }
        if self.reflection.is_some() {
            base.reflection = self.reflection;
        }
        if self.goal.is_some() {
            base.goal = self.goal;
        }
        if !self.bullets.is_empty() {
            base.bullets = self.bullets;
        }
        if !self.chips.is_empty() {
            base.chips = self.chips;
        }
        if let Some(visibility) = self.visibility {
            base.visibility = visibility;
        }
        base
    }
}

fn parse_chip(s: &str) -> Result<ProofChip, String> {
    let parts: Vec<&str> = s.splitn(3, ':').collect();
    let (kind, label, value) = match parts.as_slice() {
        [kind, value] => (*kind, *kind, *value),
        [kind, label, value] => (*kind, *label, *value),
        _ => return Err(format!("expected KIND:VALUE or KIND:LABEL:VALUE, got '{s}'")),
    };
    if value.trim().is_empty() {
        return Err("chip value must not be empty".into());
    }
    Ok(ProofChip::new(ChipKind::parse(kind), label, value))
}

#[derive(Subcommand)]
pub enum DraftAction {
    /// Overwrite the draft with these fields
    Save(EntryArgs),
    /// Print the draft for today, if any
    Show,
    /// Discard the draft
    Clear,
}

pub async fn post(ctx: &Context, args: EntryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let gate = ctx.post_gate();
    let existing = gate.fetch_today_entry(&ctx.viewer, ctx.timezone()).await?;
    let base = match &existing {
        Some(entry) => entry.fields(),
        None => ctx
            .drafts()
            .and_then(|d| d.load(&ctx.viewer, &ctx.today()).ok().flatten())
            .map(|d| d.data)
            .unwrap_or_default(),
    };

    match gate
        .save(&ctx.viewer, ctx.timezone(), existing.as_ref(), args.apply(base))
        .await
    {
        Ok(outcome) => print_json(&outcome),
        Err(CoreError::WindowExpired) => Err(
            "the 30 minute edit window has closed; only visibility can change (daybook visibility <value>)"
                .into(),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn visibility(
    ctx: &Context,
    visibility: Visibility,
) -> Result<(), Box<dyn std::error::Error>> {
    let gate = ctx.post_gate();
    let entry = gate
        .fetch_today_entry(&ctx.viewer, ctx.timezone())
        .await?
        .ok_or("no entry today (daybook post)")?;
    let updated = gate.update_visibility(&ctx.viewer, &entry, visibility).await?;
    print_json(&updated)
}

pub async fn delete(ctx: &Context, entry_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = ctx
        .post_gate()
        .delete(entry_id, &ctx.viewer, ctx.timezone())
        .await?;
    print_json(&outcome)
}

pub fn draft(ctx: &Context, action: DraftAction) -> Result<(), Box<dyn std::error::Error>> {
    let drafts = ctx
        .drafts()
        .ok_or("drafts are disabled (daybook config set drafts.enabled true)")?;
    let today = ctx.today();
    match action {
        DraftAction::Save(args) => {
            let base = drafts
                .load(&ctx.viewer, &today)?
                .map(|d| d.data)
                .unwrap_or_default();
            let draft = drafts.save(&ctx.viewer, &today, &args.apply(base))?;
            print_json(&draft)
        }
        DraftAction::Show => match drafts.load(&ctx.viewer, &today)? {
            Some(draft) => print_json(&draft),
            None => {
                println!("null");
                Ok(())
            }
        },
        DraftAction::Clear => {
            drafts.clear()?;
            println!("ok");
            Ok(())
        }
    }
}
