//! Full-screen acceptance dialog built on eframe.
//! Offers one affirmative action, plus "remind me later" while dismissals remain.

use eframe::egui;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::PromptConfig;
use crate::decision::PromptPolicy;
use crate::error::PresentationError;
use crate::session::{PromptRequest, PromptSurface, UserAction};
use crate::tos_text::TermsContent;

pub struct EguiPromptSurface {
    fullscreen: bool,
    require_scroll_confirmation: bool,
}

impl EguiPromptSurface {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            fullscreen: config.fullscreen,
            require_scroll_confirmation: config.require_scroll_confirmation,
        }
    }
}

impl PromptSurface for EguiPromptSurface {
    fn present(&mut self, request: &PromptRequest<'_>) -> Result<UserAction, PresentationError> {
        let decision = Arc::new(Mutex::new(None));
        let app = PromptApp {
            content: request.content.clone(),
            policy: request.policy,
            confirmed: false,
            reached_end: !self.require_scroll_confirmation,
            decision: Arc::clone(&decision),
        };

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([720.0, 640.0])
                .with_min_inner_size([480.0, 420.0])
                .with_title(&request.content.title)
                .with_fullscreen(self.fullscreen)
                .with_decorations(!self.fullscreen)
                .with_window_level(egui::WindowLevel::AlwaysOnTop)
                .with_close_button(false)
                .with_minimize_button(false)
                .with_resizable(!self.fullscreen),
            ..Default::default()
        };

        eframe::run_native(
            "TermsGate",
            options,
            Box::new(move |cc| {
                cc.egui_ctx.set_visuals(egui::Visuals::dark());
                Ok(Box::new(app))
            }),
        )
        .map_err(|e| PresentationError(e.to_string()))?;

        let action = decision
            .lock()
            .map_err(|_| PresentationError("prompt state poisoned".to_string()))?
            .unwrap_or(UserAction::Closed);
        Ok(action)
    }
}

// --- eframe App Implementation ---

struct PromptApp {
    content: TermsContent,
    policy: PromptPolicy,
    confirmed: bool,
    reached_end: bool,
    decision: Arc<Mutex<Option<UserAction>>>,
}

impl PromptApp {
    fn decided(&self) -> bool {
        self.decision.lock().map(|d| d.is_some()).unwrap_or(false)
    }

    fn finish(&mut self, ctx: &egui::Context, action: UserAction) {
        if let Ok(mut slot) = self.decision.lock() {
            *slot = Some(action);
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl eframe::App for PromptApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let decided = self.decided();

        // The dialog can only be left through its buttons.
        if ctx.input(|i| i.viewport().close_requested()) && !decided {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
        }
        if ctx.input(|i| i.viewport().focused) == Some(false) && !decided {
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }
        ctx.request_repaint_after(Duration::from_millis(500));

        egui::CentralPanel::default().show(ctx, |ui| {
            // --- Header ---
            ui.vertical_centered(|ui| {
                ui.heading(&self.content.title);
                ui.label(
                    egui::RichText::new(format!("Version {}", self.content.version))
                        .color(egui::Color32::GRAY)
                        .size(14.0),
                );
            });

            ui.add_space(12.0);
            ui.separator();
            ui.add_space(12.0);

            ui.label(
                egui::RichText::new("Please read and accept the following terms to continue.")
                    .strong(),
            );
            ui.add_space(8.0);

            // Scrollable terms text
            let max_height = (ui.available_height() - 120.0).max(120.0);
            let output = egui::ScrollArea::vertical()
                .max_height(max_height)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(&self.content.body).monospace());
                });
            let bottom = output.state.offset.y + output.inner_rect.height();
            if bottom + 4.0 >= output.content_size.y {
                self.reached_end = true;
            }

            // --- Footer ---
            ui.add_space(12.0);
            ui.separator();
            ui.add_space(8.0);

            ui.add_enabled_ui(self.reached_end, |ui| {
                ui.checkbox(
                    &mut self.confirmed,
                    "I have read and understood these terms",
                );
            });
            if !self.reached_end {
                ui.label(
                    egui::RichText::new("Scroll to the end of the terms to continue.")
                        .color(egui::Color32::GRAY)
                        .small(),
                );
            }

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if let PromptPolicy::Dismissible { remaining } = self.policy {
                    let label = format!("Remind me later ({} left)", remaining);
                    if !decided && ui.button(label).clicked() {
                        self.finish(ctx, UserAction::Dismiss);
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let enabled = self.confirmed && !decided;
                    if ui
                        .add_enabled(enabled, egui::Button::new("I Accept"))
                        .clicked()
                    {
                        self.finish(ctx, UserAction::Accept);
                    }
                });
            });
        });
    }
}
