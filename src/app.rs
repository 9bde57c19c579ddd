use crate::event::AppEvent;
use crate::protocol::{ChatController, ChatView, FileState, Intent, Phase};
use crate::session::{Message, OutgoingMessage, Role};
use crate::table::{Table, TableDraft};
use crate::theme::Theme;
use crate::transport::{Command, Dispatcher};
use chrono::Local;
use eframe::egui::{self, Align, Layout, RichText, ScrollArea};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};

pub struct BloodwiseApp {
    rx: Receiver<AppEvent>,
    dispatcher: Dispatcher,
    controller: ChatController,
    theme: Theme,
    models: Vec<String>,
    composer: Composer,
    rendered: (u64, bool),
    scroll_to_bottom: bool,
}

impl BloodwiseApp {
    pub fn new(
        ctx: &egui::Context,
        rx: Receiver<AppEvent>,
        dispatcher: Dispatcher,
        mut controller: ChatController,
        models: Vec<String>,
    ) -> Self {
        let theme = Theme::default();
        theme.apply_visuals(ctx);

        let commands = controller.start();
        let app = Self {
            rx,
            dispatcher,
            controller,
            theme,
            models,
            composer: Composer::default(),
            rendered: (0, false),
            scroll_to_bottom: true,
        };
        app.dispatch(commands);
        app
    }

    fn dispatch(&self, commands: Vec<Command>) {
        for command in commands {
            self.dispatcher.execute(command);
        }
    }

    fn send_intent(&mut self, intent: Intent) {
        let submitting = matches!(intent, Intent::Submit(_));
        match self.controller.handle(intent) {
            Ok(commands) => {
                if submitting {
                    self.composer.reset();
                    self.scroll_to_bottom = true;
                }
                self.dispatch(commands);
            }
            Err(err) => self.composer.error = Some(err.to_string()),
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    let commands = self.controller.apply(event);
                    self.dispatch(commands);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn accept_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        for file in dropped {
            if let Some(bytes) = file.bytes.as_deref() {
                self.composer.load_csv(bytes);
            } else if let Some(path) = file.path.as_deref() {
                self.composer.load_csv_file(path);
            }
        }
    }

    fn render_top_bar(&self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        let view = self.controller.view();
        let theme = &self.theme;
        let models = &self.models;

        egui::TopBottomPanel::top("top_bar")
            .frame(theme.bar_frame())
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new("Bloodwise")
                            .strong()
                            .size(18.0)
                            .color(theme.accent_primary),
                    );
                    ui.separator();

                    ui.add_enabled_ui(view.route.chat_id.is_none() && !view.composing, |ui| {
                        egui::ComboBox::from_id_salt("model_select")
                            .selected_text(view.route.model.as_str())
                            .show_ui(ui, |ui| {
                                for model in models {
                                    let selected = *model == view.route.model;
                                    let clicked =
                                        ui.selectable_label(selected, model.as_str()).clicked();
                                    if clicked && !selected {
                                        intents.push(Intent::SwitchModel(model.clone()));
                                    }
                                }
                            });
                    })
                    .response
                    .on_disabled_hover_text("Start a new chat to switch models");

                    let link = view.route.to_link();
                    ui.label(RichText::new(&link).monospace().color(theme.text_muted))
                        .on_hover_text("Resume this view with --link");
                    if ui.small_button("Copy link").clicked() {
                        ui.ctx().copy_text(link);
                    }

                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if ui.button("New chat").clicked() {
                            intents.push(Intent::NewChat);
                        }
                        let label = if view.history_open {
                            "Hide history"
                        } else {
                            "History"
                        };
                        if view.active && ui.button(label).clicked() {
                            intents.push(Intent::ToggleHistory);
                        }
                    });
                });
            });
    }

    fn render_notice(&self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        let view = self.controller.view();
        let Some(notice) = view.notice else {
            return;
        };

        let mut open = true;
        egui::Window::new(notice.title)
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(notice.message.as_str());
                ui.add_space(self.theme.spacing_8);
                if ui.button("Dismiss").clicked() {
                    intents.push(Intent::DismissNotice);
                }
            });
        if !open {
            intents.push(Intent::DismissNotice);
        }
    }

    fn render_history_panel(&self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        let view = self.controller.view();
        egui::SidePanel::left("history_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Chats");
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if ui.small_button("Close").clicked() {
                            intents.push(Intent::SetHistoryOpen(false));
                        }
                    });
                });
                ui.separator();
                show_history(ui, &self.theme, &view, intents);
            });
    }

    fn render_idle(&mut self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(self.theme.spacing_24 * 2.0);
                ui.heading(RichText::new("Understand your blood test").size(28.0));
                ui.label(
                    RichText::new("Ask a question or attach your results as a table.")
                        .color(self.theme.text_muted),
                );
                ui.add_space(self.theme.spacing_16);

                if self.composer.show(ui, &self.theme, false) {
                    intents.push(Intent::Submit(self.composer.outgoing()));
                }

                ui.add_space(self.theme.spacing_24);
                ui.set_max_width(self.theme.composer_max_width);
                ui.label(RichText::new("Recent chats").strong());
                let view = self.controller.view();
                show_history(ui, &self.theme, &view, intents);
            });
        });
    }

    fn render_chat(&mut self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        let busy = self.controller.composing();
        let margin = egui::Margin::same(self.theme.spacing_12 as i8);
        egui::TopBottomPanel::bottom("composer_panel")
            .frame(egui::Frame::new().inner_margin(margin))
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    if self.composer.show(ui, &self.theme, busy) {
                        intents.push(Intent::Submit(self.composer.outgoing()));
                    }
                });
            });

        let view = self.controller.view();
        let theme = &self.theme;
        let scroll_to_bottom = self.scroll_to_bottom;
        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(chat) = view.chat {
                let title = if chat.title.trim().is_empty() {
                    "New chat"
                } else {
                    chat.title.as_str()
                };
                ui.heading(title);
                ui.separator();
            }

            ScrollArea::vertical()
                .id_salt("chat_transcript")
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    match view.chat {
                        Some(chat) => {
                            for message in &chat.messages {
                                show_message(ui, theme, message, view.files);
                                ui.add_space(theme.spacing_8);
                            }
                        }
                        None if !view.composing => {
                            ui.label(
                                RichText::new("No messages to show.").color(theme.text_muted),
                            );
                        }
                        None => {}
                    }

                    if view.composing {
                        ui.horizontal(|ui| {
                            ui.add(egui::Spinner::new());
                            ui.label(
                                RichText::new("Assistant is typing...").color(theme.text_muted),
                            );
                        });
                    }

                    if view.phase == Phase::ComposeFailed {
                        ui.label(
                            RichText::new("Your last message was not delivered.")
                                .color(theme.danger),
                        );
                    }

                    if scroll_to_bottom {
                        ui.scroll_to_cursor(Some(Align::BOTTOM));
                    }
                });
        });
        self.scroll_to_bottom = false;
    }
}

impl eframe::App for BloodwiseApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        self.accept_dropped_files(ctx);

        let rendered = (self.controller.view().revision, self.controller.composing());
        if rendered != self.rendered {
            self.rendered = rendered;
            self.scroll_to_bottom = true;
        }

        let mut intents = Vec::new();
        self.render_top_bar(ctx, &mut intents);
        self.render_notice(ctx, &mut intents);
        if self.controller.active() {
            if self.controller.view().history_open {
                self.render_history_panel(ctx, &mut intents);
            }
            self.render_chat(ctx, &mut intents);
        } else {
            self.render_idle(ctx, &mut intents);
        }

        for intent in intents {
            self.send_intent(intent);
        }
    }
}

fn show_history(ui: &mut egui::Ui, theme: &Theme, view: &ChatView<'_>, intents: &mut Vec<Intent>) {
    if view.history.is_empty() {
        ui.label(RichText::new("No chats yet.").color(theme.text_muted));
        return;
    }

    ScrollArea::vertical().id_salt("chat_history").show(ui, |ui| {
        for summary in view.history {
            let selected = view.route.chat_id.as_deref() == Some(summary.chat_id.as_str());
            if ui.selectable_label(selected, summary.label()).clicked() {
                intents.push(Intent::OpenChat(summary.chat_id.clone()));
            }
        }
    });
}

fn role_label(role: &Role) -> &str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::Other(other) if other == "cnn" => "Image model",
        Role::Other(other) => other,
    }
}

fn show_message(
    ui: &mut egui::Ui,
    theme: &Theme,
    message: &Message,
    files: &BTreeMap<String, FileState>,
) {
    let layout = if message.role == Role::User {
        Layout::top_down(Align::Max)
    } else {
        Layout::top_down(Align::Min)
    };

    ui.with_layout(layout, |ui| {
        let max_width = ui.available_width() * 0.8;
        theme.bubble_frame(&message.role).show(ui, |ui| {
            ui.set_max_width(max_width);
            ui.label(
                RichText::new(role_label(&message.role))
                    .small()
                    .color(theme.text_muted),
            );

            if let Some(table) = &message.file {
                show_table(ui, &message.message_id, table);
            }
            if let Some(path) = &message.file_path {
                match files.get(path) {
                    Some(FileState::Ready(table)) => show_table(ui, path, table),
                    Some(FileState::Failed(err)) => {
                        let text = format!("Could not load {path}: {err}");
                        ui.label(RichText::new(text).color(theme.danger));
                    }
                    Some(FileState::Loading) | None => {
                        ui.add(egui::Spinner::new());
                    }
                }
            }
            if let Some(content) = &message.content {
                ui.label(content.as_str());
            }
            if let Some(prediction) = &message.results {
                theme.prediction_frame().show(ui, |ui| {
                    ui.label(format!(
                        "{} ({}%)",
                        prediction.prediction_label, prediction.accuracy
                    ));
                });
            }
            if let Some(timestamp) = message.timestamp {
                ui.label(
                    RichText::new(timestamp.with_timezone(&Local).format("%H:%M").to_string())
                        .small()
                        .color(theme.text_muted),
                );
            }
        });
    });
}

fn show_table(ui: &mut egui::Ui, id: &str, table: &Table) {
    ScrollArea::horizontal().id_salt(("table_scroll", id)).show(ui, |ui| {
        egui::Grid::new(("table", id)).striped(true).show(ui, |ui| {
            for column in &table.columns {
                ui.strong(column.as_str());
            }
            ui.end_row();
            for row in &table.rows {
                for cell in row {
                    ui.label(cell.as_str());
                }
                ui.end_row();
            }
        });
    });
}

/// Takes a plain Enter press out of the frame's input. Enter with any
/// modifier stays for the text edit, so Shift+Enter inserts a newline.
fn consume_send_key(input: &mut egui::InputState) -> bool {
    let before = input.events.len();
    input.events.retain(|event| {
        !matches!(
            event,
            egui::Event::Key {
                key: egui::Key::Enter,
                pressed: true,
                modifiers,
                ..
            } if modifiers.is_none()
        )
    });
    input.events.len() != before
}

enum ColumnEdit {
    Rename(usize),
    Delete(usize),
}

#[derive(Default)]
struct Composer {
    text: String,
    table: Option<TableDraft>,
    csv_path: String,
    new_column: String,
    rename: String,
    error: Option<String>,
}

impl Composer {
    fn outgoing(&self) -> OutgoingMessage {
        OutgoingMessage::compose(&self.text, self.table.as_ref().map(TableDraft::to_table))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn load_csv(&mut self, bytes: &[u8]) {
        match TableDraft::from_csv(bytes) {
            Ok(draft) => {
                self.table = Some(draft);
                self.error = None;
            }
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    fn load_csv_file(&mut self, path: &Path) {
        match std::fs::read(path) {
            Ok(bytes) => self.load_csv(&bytes),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to read csv");
                self.error = Some(format!("could not read {}: {err}", path.display()));
            }
        }
    }

    /// Returns true when the user asked to send.
    fn show(&mut self, ui: &mut egui::Ui, theme: &Theme, busy: bool) -> bool {
        let mut send = false;
        ui.set_max_width(theme.composer_max_width);
        theme.composer_frame().show(ui, |ui| {
            if let Some(error) = &self.error {
                ui.label(RichText::new(error).small().color(theme.danger));
            }
            if self.table.is_some() {
                self.show_table_editor(ui, theme);
            }

            let text_id = ui.make_persistent_id("composer_text");
            if ui.memory(|memory| memory.has_focus(text_id)) && ui.input_mut(consume_send_key) {
                send = true;
            }
            ui.add(
                egui::TextEdit::multiline(&mut self.text)
                    .id(text_id)
                    .desired_rows(2)
                    .desired_width(f32::INFINITY)
                    .hint_text("Ask about your blood test results..."),
            );

            ui.horizontal(|ui| {
                if self.table.is_none() && ui.button("Create table").clicked() {
                    self.table = Some(TableDraft::blank());
                }
                ui.add(
                    egui::TextEdit::singleline(&mut self.csv_path)
                        .desired_width(200.0)
                        .hint_text("CSV path, or drop a file"),
                );
                if ui
                    .add_enabled(!self.csv_path.trim().is_empty(), egui::Button::new("Upload CSV"))
                    .clicked()
                {
                    let path = self.csv_path.trim().to_string();
                    self.load_csv_file(Path::new(&path));
                }

                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    let label = if busy { "Waiting..." } else { "Send" };
                    let button = egui::Button::new(RichText::new(label).color(theme.text_on_accent))
                        .fill(theme.accent_primary);
                    if ui.add_enabled(!busy && !self.outgoing().is_empty(), button).clicked() {
                        send = true;
                    }
                });
            });
        });
        send && !busy
    }

    fn show_table_editor(&mut self, ui: &mut egui::Ui, theme: &Theme) {
        let Self {
            table,
            new_column,
            rename,
            error,
            ..
        } = self;
        let Some(draft) = table.as_mut() else {
            return;
        };

        let mut edit = None;
        ScrollArea::horizontal().id_salt("table_editor_scroll").show(ui, |ui| {
            egui::Grid::new("table_editor").striped(true).show(ui, |ui| {
                for (index, column) in draft.columns().iter().enumerate() {
                    ui.menu_button(column.as_str(), |ui| {
                        ui.text_edit_singleline(&mut *rename);
                        if ui.button("Rename").clicked() {
                            edit = Some(ColumnEdit::Rename(index));
                            ui.close_menu();
                        }
                        if ui.button("Delete column").clicked() {
                            edit = Some(ColumnEdit::Delete(index));
                            ui.close_menu();
                        }
                    });
                }
                ui.end_row();

                let mut changed = Vec::new();
                for (row, cells) in draft.rows().iter().enumerate() {
                    for (column, cell) in cells.iter().enumerate() {
                        let mut value = cell.clone();
                        if ui
                            .add(egui::TextEdit::singleline(&mut value).desired_width(96.0))
                            .changed()
                        {
                            changed.push((row, column, value));
                        }
                    }
                    ui.end_row();
                }
                for (row, column, value) in changed {
                    draft.set_cell(row, column, value);
                }
            });
        });

        let result = match edit {
            Some(ColumnEdit::Rename(index)) => draft.rename_column(index, rename),
            Some(ColumnEdit::Delete(index)) => draft.delete_column(index),
            None => Ok(()),
        };
        if let Err(err) = result {
            *error = Some(err.to_string());
        } else if edit.is_some() {
            rename.clear();
            *error = None;
        }

        let mut remove = false;
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(new_column)
                    .desired_width(140.0)
                    .hint_text("Column name"),
            );
            if ui.button("Add column").clicked() {
                match draft.add_column(new_column) {
                    Ok(()) => new_column.clear(),
                    Err(err) => *error = Some(err.to_string()),
                }
            }
            if ui.button("Add row").clicked() {
                draft.add_row();
            }
            if ui
                .button(RichText::new("Remove table").color(theme.danger))
                .clicked()
            {
                remove = true;
            }
        });
        if remove {
            *table = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::consume_send_key;
    use eframe::egui::{self, Event, Key, Modifiers, RawInput};

    fn enter(modifiers: Modifiers) -> Event {
        Event::Key {
            key: Key::Enter,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers,
        }
    }

    fn sends(event: Event) -> (bool, usize) {
        let ctx = egui::Context::default();
        let mut outcome = (false, 0);
        let raw = RawInput {
            events: vec![event],
            ..Default::default()
        };
        let _ = ctx.run(raw, |ctx| {
            outcome = ctx.input_mut(|input| {
                let sent = consume_send_key(input);
                let left = input
                    .events
                    .iter()
                    .filter(|event| matches!(event, Event::Key { key: Key::Enter, .. }))
                    .count();
                (sent, left)
            });
        });
        outcome
    }

    #[test]
    fn plain_enter_sends() {
        assert_eq!(sends(enter(Modifiers::NONE)), (true, 0));
    }

    #[test]
    fn shift_enter_is_left_for_a_newline() {
        assert_eq!(sends(enter(Modifiers::SHIFT)), (false, 1));
    }
}
