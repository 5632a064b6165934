use crate::actions::DeviceActions;
use crate::api::ApiClient;
use crate::filter::{filter_devices, FilterCriteria};
use crate::models::{format_display_time, Device, DeviceId, DeviceStatus, MetricSample, Timeframe};
use crate::quality::{latency_quality, signal_quality, speed_quality, Quality};
use crate::scheduler::SchedulerHandle;
use crate::store::{DeviceStore, Notice, NoticeKind, PollState, StoreSnapshot};
use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::time::Duration;

const SIGNAL_LINE: egui::Color32 = egui::Color32::from_rgb(136, 132, 216);
const DOWNLOAD_LINE: egui::Color32 = egui::Color32::from_rgb(130, 202, 157);

pub struct DashboardApp {
    store: DeviceStore,
    actions: DeviceActions<ApiClient>,
    // Dropping the handle stops polling when the window closes.
    _scheduler: SchedulerHandle,
    api_url: String,
    filters: FilterCriteria,
    pending_delete: Option<DeviceId>,
}

impl DashboardApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        store: DeviceStore,
        actions: DeviceActions<ApiClient>,
        scheduler: SchedulerHandle,
        api_url: String,
    ) -> Self {
        Self {
            store,
            actions,
            _scheduler: scheduler,
            api_url,
            filters: FilterCriteria::default(),
            pending_delete: None,
        }
    }

    fn render_header(&mut self, ui: &mut egui::Ui, snapshot: &StoreSnapshot) {
        ui.horizontal(|ui| {
            ui.add_space(10.0);

            // Title
            ui.heading("📶 Network Monitoring Dashboard");
            ui.add_space(20.0);
            ui.label(egui::RichText::new(&self.api_url).weak());

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(10.0);

                let polling = snapshot.poll_state == PollState::Polling;
                if ui
                    .add_enabled(
                        !polling,
                        egui::Button::new(egui::RichText::new("🔄 Refresh").color(egui::Color32::WHITE))
                            .fill(egui::Color32::from_rgb(0, 120, 215)),
                    )
                    .clicked()
                {
                    self.store.request_refresh();
                }
                ui.add_space(10.0);

                if polling {
                    ui.label("⏳ Refreshing...");
                } else if let Some(at) = snapshot.last_refreshed {
                    ui.colored_label(
                        egui::Color32::from_rgb(50, 150, 50),
                        format!("● Updated {}", format_display_time(&at)),
                    );
                } else {
                    ui.colored_label(egui::Color32::from_rgb(150, 150, 150), "● Waiting for data");
                }
            });
        });

        ui.add_space(5.0);
        ui.separator();
    }

    fn render_filters(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Filters").size(16.0).strong());
        ui.add_space(5.0);

        ui.label("Location");
        ui.text_edit_singleline(&mut self.filters.location);
        ui.add_space(5.0);

        ui.label("User");
        ui.text_edit_singleline(&mut self.filters.user);
        ui.add_space(5.0);

        ui.label("Wi-Fi SSID");
        ui.text_edit_singleline(&mut self.filters.ssid);
        ui.add_space(10.0);

        if ui
            .add_enabled(!self.filters.is_empty(), egui::Button::new("✖ Clear filters"))
            .clicked()
        {
            self.filters.clear();
        }
    }

    fn render_device_table(&mut self, ui: &mut egui::Ui, snapshot: &StoreSnapshot) {
        let visible = filter_devices(&snapshot.devices, &self.filters);

        ui.label(
            egui::RichText::new(format!(
                "Devices ({} of {})",
                visible.len(),
                snapshot.devices.len()
            ))
            .size(16.0)
            .strong(),
        );
        ui.add_space(5.0);

        egui::ScrollArea::vertical()
            .id_source("device_table_scroll")
            .max_height(320.0)
            .show(ui, |ui| {
                egui::Grid::new("device_table")
                    .striped(true)
                    .num_columns(8)
                    .spacing([18.0, 6.0])
                    .show(ui, |ui| {
                        for title in [
                            "Status",
                            "Device Name",
                            "User",
                            "Location",
                            "Connection",
                            "Signal",
                            "Last Seen (PHT)",
                            "Actions",
                        ] {
                            ui.label(egui::RichText::new(title).strong().size(12.0));
                        }
                        ui.end_row();

                        for device in &visible {
                            self.render_device_row(ui, device, snapshot);
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_device_row(&mut self, ui: &mut egui::Ui, device: &Device, snapshot: &StoreSnapshot) {
        let status_color = match device.status {
            DeviceStatus::Online => egui::Color32::from_rgb(50, 150, 50),
            DeviceStatus::Offline => egui::Color32::from_rgb(200, 50, 50),
            DeviceStatus::Unknown => egui::Color32::from_rgb(150, 150, 150),
        };
        ui.colored_label(status_color, device.status.as_str());

        let selected = snapshot.selected == Some(device.id);
        if ui.selectable_label(selected, device.hostname.as_str()).clicked() {
            self.store.select(device.id);
        }

        ui.label(device.username.as_deref().unwrap_or("-"));
        ui.label(device.location.as_deref().unwrap_or("-"));

        ui.vertical(|ui| {
            ui.label(device.connection_type.as_deref().unwrap_or("-"));
            if let Some(ssid) = &device.wifi_ssid {
                ui.label(egui::RichText::new(ssid).small().weak());
            }
        });

        match device.signal_strength {
            Some(dbm) => {
                let quality = signal_quality(Some(dbm));
                ui.colored_label(
                    quality_color(quality),
                    format!("{dbm} dBm ({})", quality.label()),
                );
            }
            None => {
                ui.label("N/A");
            }
        }

        ui.label(device.last_seen_display());

        let busy = snapshot.action_busy;
        ui.menu_button("⋮", |ui| {
            if ui
                .add_enabled(!busy, egui::Button::new("Run Speed Test"))
                .clicked()
            {
                self.actions.run_speed_test(device.id);
                ui.close_menu();
            }
            if ui
                .add_enabled(!busy, egui::Button::new("Delete Device"))
                .clicked()
            {
                self.pending_delete = Some(device.id);
                ui.close_menu();
            }
        });
    }

    fn render_quality_card(&self, ui: &mut egui::Ui, device: &Device) {
        egui::Frame::none()
            .fill(egui::Color32::from_rgb(240, 240, 240))
            .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(200, 200, 200)))
            .inner_margin(12.0)
            .show(ui, |ui| {
                ui.label(egui::RichText::new("Network Quality Metrics").size(16.0).strong());
                ui.label(egui::RichText::new(&device.hostname).weak());
                ui.add_space(8.0);

                metric_box(ui, "Signal Strength", device.signal_strength, "dBm", signal_quality(device.signal_strength));
                metric_box(ui, "Latency", device.latency, "ms", latency_quality(device.latency));
                metric_box(ui, "Download Speed", device.download_speed, "Mbps", speed_quality(device.download_speed));
                metric_box(ui, "Upload Speed", device.upload_speed, "Mbps", speed_quality(device.upload_speed));
            });
    }

    fn render_metrics_chart(&self, ui: &mut egui::Ui, snapshot: &StoreSnapshot) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Network Metrics Over Time").size(16.0).strong());
            ui.add_space(20.0);

            let mut timeframe = snapshot.timeframe;
            egui::ComboBox::from_id_source("timeframe")
                .selected_text(timeframe.label())
                .show_ui(ui, |ui| {
                    for option in Timeframe::ALL {
                        ui.selectable_value(&mut timeframe, option, option.label());
                    }
                });
            if timeframe != snapshot.timeframe {
                self.store.set_timeframe(timeframe);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("✖ Close").clicked() {
                    self.store.clear_selection();
                }
            });
        });
        ui.add_space(5.0);

        let Some(first) = snapshot.metrics.first() else {
            ui.label(egui::RichText::new("No samples for this timeframe yet.").weak());
            return;
        };
        ui.label(
            egui::RichText::new(format!(
                "Minutes since {} (PHT)",
                format_display_time(&first.timestamp)
            ))
            .small()
            .weak(),
        );

        let signal = series(&snapshot.metrics, |s| s.signal_strength);
        let download = series(&snapshot.metrics, |s| s.download_speed);

        Plot::new("metrics_plot")
            .height(260.0)
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                plot_ui.line(
                    Line::new(PlotPoints::from(signal))
                        .color(SIGNAL_LINE)
                        .name("Signal Strength (dBm)"),
                );
                plot_ui.line(
                    Line::new(PlotPoints::from(download))
                        .color(DOWNLOAD_LINE)
                        .name("Download Speed (Mbps)"),
                );
            });
    }

    fn render_delete_dialog(&mut self, ctx: &egui::Context) {
        let Some(device_id) = self.pending_delete else {
            return;
        };

        egui::Window::new("Confirm Delete")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Are you sure you want to delete this device? This action cannot be undone.");
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        self.pending_delete = None;
                    }
                    if ui
                        .add(
                            egui::Button::new(egui::RichText::new("Delete").color(egui::Color32::WHITE))
                                .fill(egui::Color32::from_rgb(200, 50, 50)),
                        )
                        .clicked()
                    {
                        self.actions.delete_device(device_id);
                        self.pending_delete = None;
                    }
                });
            });
    }

    fn render_notice(&self, ctx: &egui::Context, notice: &Notice) {
        egui::Window::new(notice.title.as_str())
            .id(egui::Id::new("notice_window"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                let color = match notice.kind {
                    NoticeKind::Info => egui::Color32::from_rgb(50, 50, 50),
                    NoticeKind::Error => egui::Color32::from_rgb(200, 50, 50),
                };
                ui.colored_label(color, notice.message.as_str());
                ui.add_space(10.0);
                if ui.button("OK").clicked() {
                    self.store.dismiss_notice();
                }
            });
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snapshot = self.store.snapshot();

        egui::SidePanel::left("filter_panel")
            .resizable(false)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                self.render_filters(ui);
                ui.add_space(15.0);
                ui.separator();
                ui.add_space(10.0);

                match snapshot.selected_device() {
                    Some(device) => self.render_quality_card(ui, device),
                    None => {
                        ui.label(egui::RichText::new("Select a device to see its quality.").weak());
                    }
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);

            self.render_header(ui, &snapshot);
            ui.add_space(15.0);

            self.render_device_table(ui, &snapshot);

            if snapshot.selected.is_some() {
                ui.add_space(15.0);
                ui.separator();
                ui.add_space(10.0);
                self.render_metrics_chart(ui, &snapshot);
            }
        });

        self.render_delete_dialog(ctx);
        if let Some(notice) = &snapshot.notice {
            self.render_notice(ctx, notice);
        }

        // Request repaint so background refreshes show up
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

fn metric_box(ui: &mut egui::Ui, label: &str, value: Option<f64>, unit: &str, quality: Quality) {
    ui.label(egui::RichText::new(label).small().weak());
    let text = match value {
        Some(v) => format!("{v} {unit}"),
        None => format!("N/A {unit}"),
    };
    ui.label(egui::RichText::new(text).size(16.0));
    ui.add(
        egui::ProgressBar::new(f32::from(quality.score()) / 100.0)
            .fill(quality_color(quality))
            .desired_width(220.0),
    );
    ui.add_space(8.0);
}

fn quality_color(quality: Quality) -> egui::Color32 {
    match quality {
        Quality::Excellent => egui::Color32::from_rgb(50, 150, 50),
        Quality::Good => egui::Color32::from_rgb(0, 120, 215),
        Quality::Fair => egui::Color32::from_rgb(230, 150, 0),
        Quality::Poor => egui::Color32::from_rgb(200, 50, 50),
        Quality::Unknown => egui::Color32::from_rgb(150, 150, 150),
    }
}

/// Chart points as (minutes since first sample, value), skipping gaps.
fn series(samples: &[MetricSample], value: impl Fn(&MetricSample) -> Option<f64>) -> Vec<[f64; 2]> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .filter_map(|s| {
            let minutes = (s.timestamp - first.timestamp).num_seconds() as f64 / 60.0;
            value(s).map(|v| [minutes, v])
        })
        .collect()
}
