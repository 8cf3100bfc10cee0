mod components;
mod effects;
mod error;
mod logging;
mod media;
mod recent_uploads;
mod settings;
mod storage;
mod style;
mod transport;
mod tray;
mod tray_anchor;
mod tray_controller;
mod upload_manager;
mod upload_session;
mod window_host;

use effects::SideEffects;
use error::UploadError;
use media::UploadFile;
use recent_uploads::RecentUploadsStore;
use settings::AppConfig;
use storage::{JsonFileStore, KeyValueStore, MemoryStore};
use transport::{HttpTransport, UploadTransport};
use tray::{TrayAction, TrayManager};
use tray_anchor::Rect;
use tray_controller::{ControlFlow, TrayController, TrayEvent};
use upload_manager::{UploadCommand, UploadEvent};
use upload_session::{SessionState, TransferOutcome, UploadSession};
use window_host::IcedWindowHost;

use iced::widget::{button, column, container, horizontal_space, row, text, Column};
use iced::{event, keyboard, time, window, Element, Event, Length, Subscription, Task, Theme};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const TRAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn main() -> iced::Result {
    let config = AppConfig::load();
    logging::init(config.debug_logging);
    tracing::info!(api_url = %config.api_url, "Starting Trayshot");

    let window_settings = window::Settings {
        size: iced::Size::new(config.window_width as f32, config.window_height as f32),
        visible: false,
        resizable: false,
        decorations: false,
        level: window::Level::AlwaysOnTop,
        exit_on_close_request: false,
        ..Default::default()
    };

    iced::application("Trayshot", Trayshot::update, Trayshot::view)
        .theme(|_| Theme::Dark)
        .subscription(Trayshot::subscription)
        .window(window_settings)
        .run_with(move || Trayshot::new(config))
}

struct Trayshot {
    window_id: Option<window::Id>,
    tray: Option<TrayManager>,
    controller: TrayController,
    // Uploads
    session: UploadSession,
    recent: RecentUploadsStore,
    effects: SideEffects,
    transport: Option<Arc<dyn UploadTransport>>,
    upload_tx: Option<mpsc::Sender<UploadCommand>>,
    upload_rx: Option<Arc<tokio::sync::Mutex<mpsc::Receiver<UploadEvent>>>>,
    progress_rx: watch::Receiver<u8>,
    tray_progress: Option<u8>,
    is_drag_active: bool,
}

#[derive(Debug, Clone)]
enum Message {
    WindowReady(Option<window::Id>),
    // Tray
    TrayTick,
    TrayActivated(Option<Rect>),
    GeometryReady {
        tray: Option<Rect>,
        window: iced::Size,
        monitor: Option<iced::Size>,
        scale_factor: f32,
    },
    CloseRequested(window::Id),
    Quit,
    // Files
    FileHovered,
    FilesHoveredLeft,
    FileDropped(PathBuf),
    SelectFile,
    FileSelected(Option<PathBuf>),
    FileLoaded(Result<UploadFile, String>),
    // Uploads
    CancelUpload,
    PollUploadEvents,
    Upload(Option<UploadEvent>),
    // Recent uploads
    CopyLastUpload,
    CopyUpload(String),
    ClearRecent,
}

impl Trayshot {
    fn new(config: AppConfig) -> (Self, Task<Message>) {
        if let Err(e) = config.save_if_missing() {
            tracing::warn!(error = %e, "Failed to write default config");
        }

        let storage: Box<dyn KeyValueStore> = match AppConfig::storage_path() {
            Some(path) => {
                let store = JsonFileStore::new(path);
                tracing::debug!(path = %store.path().display(), "Using storage file");
                Box::new(store)
            }
            None => {
                tracing::warn!("No data directory; recent uploads will not persist");
                Box::new(MemoryStore::new())
            }
        };
        let mut recent = RecentUploadsStore::new(storage);
        tracing::debug!(count = recent.list().len(), "Loaded recent uploads");

        let transport: Option<Arc<dyn UploadTransport>> = match HttpTransport::new(
            config.api_base(),
            Duration::from_secs(config.request_timeout_secs),
        ) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create HTTP client");
                None
            }
        };

        let tray = match TrayManager::new() {
            Ok(tray) => Some(tray),
            Err(e) => {
                tracing::warn!(error = %e, "Tray icon unavailable; showing window instead");
                None
            }
        };

        let session = UploadSession::new();
        let progress_rx = session.watch_progress();

        let app = Self {
            window_id: None,
            tray,
            controller: TrayController::new(),
            session,
            recent,
            effects: SideEffects::desktop(),
            transport,
            upload_tx: None,
            upload_rx: None,
            progress_rx,
            tray_progress: None,
            is_drag_active: false,
        };

        (app, window::get_oldest().map(Message::WindowReady))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::WindowReady(id) => {
                self.window_id = id;
                // Without a tray icon the window is the only way in.
                if self.tray.is_none() {
                    return self.update(Message::TrayActivated(None));
                }
            }
            Message::TrayTick => {
                self.sync_tray_tooltip();
                let action = self.tray.as_mut().and_then(|tray| {
                    tray.update();
                    tray.poll_events()
                });
                match action {
                    Some(TrayAction::Activate(bounds)) => {
                        return self.update(Message::TrayActivated(bounds));
                    }
                    Some(TrayAction::Quit) => return self.update(Message::Quit),
                    None => {}
                }
            }
            Message::TrayActivated(tray) => {
                let Some(id) = self.window_id else {
                    return Task::none();
                };
                // Sample fresh geometry on every activation; the tray and
                // display layout can change while the window is hidden.
                return window::get_size(id).then(move |size| {
                    window::monitor_size(id).then(move |monitor| {
                        window::get_scale_factor(id).map(move |scale_factor| {
                            Message::GeometryReady {
                                tray,
                                window: size,
                                monitor,
                                scale_factor,
                            }
                        })
                    })
                });
            }
            Message::GeometryReady {
                tray,
                window,
                monitor,
                scale_factor,
            } => {
                if let Some(id) = self.window_id {
                    let geometry =
                        window_host::sample_geometry(tray, window, monitor, scale_factor);
                    let mut host = IcedWindowHost::new(id, geometry);
                    self.controller.handle(TrayEvent::Activated, &mut host);
                    tracing::debug!(visibility = ?self.controller.visibility(), "Tray activated");
                    return host.into_task();
                }
            }
            Message::CloseRequested(id) => {
                let mut host = IcedWindowHost::new(id, Default::default());
                self.controller.handle(TrayEvent::CloseRequested, &mut host);
                return host.into_task();
            }
            Message::Quit => {
                let flow = match self.window_id {
                    Some(id) => {
                        let mut host = IcedWindowHost::<Message>::new(id, Default::default());
                        self.controller.handle(TrayEvent::Quit, &mut host)
                    }
                    None => ControlFlow::Exit,
                };
                if flow == ControlFlow::Exit {
                    self.session.cancel();
                    return iced::exit();
                }
            }

            // Files
            Message::FileHovered => self.is_drag_active = true,
            Message::FilesHoveredLeft => self.is_drag_active = false,
            Message::FileDropped(path) => {
                self.is_drag_active = false;
                return Self::load_file(path);
            }
            Message::SelectFile => {
                return Task::future(async {
                    let path = tokio::task::spawn_blocking(|| {
                        rfd::FileDialog::new()
                            .add_filter("Images", media::IMAGE_EXTENSIONS)
                            .pick_file()
                    })
                    .await
                    .unwrap_or(None);
                    Message::FileSelected(path)
                });
            }
            Message::FileSelected(path) => {
                if let Some(p) = path {
                    return Self::load_file(p);
                }
                tracing::debug!("No file selected");
            }
            Message::FileLoaded(Ok(file)) => return self.begin_upload(file),
            Message::FileLoaded(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read file");
                self.effects.upload_failed(&e);
            }

            // Uploads
            Message::CancelUpload => {
                tracing::debug!(session = ?self.session.id(), "Cancel requested");
                if self.session.cancel() {
                    self.session.reset();
                }
            }
            Message::PollUploadEvents => {
                if let Some(rx) = &self.upload_rx {
                    let rx = rx.clone();
                    return Task::future(async move {
                        let mut rx = rx.lock().await;
                        Message::Upload(rx.recv().await)
                    });
                }
            }
            Message::Upload(Some(event)) => {
                self.apply_upload_event(event);
                return self.update(Message::PollUploadEvents);
            }
            Message::Upload(None) => {
                tracing::warn!("Upload manager stopped");
                self.upload_tx = None;
                self.upload_rx = None;
            }

            // Recent uploads
            Message::CopyLastUpload => match self.recent.latest() {
                Some(url) => self.effects.copy_url(url),
                None => self.effects.nothing_uploaded(),
            },
            Message::CopyUpload(url) => self.effects.copy_url(&url),
            Message::ClearRecent => {
                if let Err(e) = self.recent.clear() {
                    tracing::warn!(error = %e, "Failed to clear recent uploads");
                }
            }
        }
        Task::none()
    }

    fn sync_tray_tooltip(&mut self) {
        let Some(tray) = &self.tray else {
            return;
        };
        let percent = *self.progress_rx.borrow_and_update();
        let shown = self.session.is_transferring().then_some(percent);
        if shown != self.tray_progress {
            tray.show_progress(shown);
            self.tray_progress = shown;
        }
    }

    fn load_file(path: PathBuf) -> Task<Message> {
        Task::future(async move {
            let result = UploadFile::load(&path)
                .await
                .map_err(|e| format!("{}: {}", path.display(), e));
            Message::FileLoaded(result)
        })
    }

    /// A new file replaces a running upload: cancel, reset, then start.
    fn begin_upload(&mut self, file: UploadFile) -> Task<Message> {
        let ticket = match self.session.begin(&file, &self.effects) {
            Ok(ticket) => ticket,
            Err(UploadError::UnsupportedMediaType(_)) => return Task::none(),
            Err(e) => {
                tracing::warn!(error = %e, state = %self.session.state(), "Upload not started");
                return Task::none();
            }
        };

        let mut poll = Task::none();
        if self.upload_tx.is_none() {
            let Some(transport) = self.transport.clone() else {
                self.session.cancel();
                self.session.reset();
                self.effects.upload_failed("HTTP client unavailable");
                return Task::none();
            };
            let (tx, rx) = upload_manager::create_upload_manager(transport);
            self.upload_tx = Some(tx);
            self.upload_rx = Some(Arc::new(tokio::sync::Mutex::new(rx)));
            poll = self.update(Message::PollUploadEvents);
        }

        let sent = self.upload_tx.as_ref().map(|tx| {
            tx.try_send(UploadCommand::Start {
                session: ticket.session,
                file,
                cancel: ticket.cancel,
            })
        });
        if !matches!(sent, Some(Ok(()))) {
            tracing::error!(session = %ticket.session, "Upload manager unavailable");
            self.session.cancel();
            self.session.reset();
            self.effects.upload_failed("Upload manager unavailable");
        }

        poll
    }

    fn apply_upload_event(&mut self, event: UploadEvent) {
        tracing::trace!(session = %event.session(), "Upload event");
        match event {
            UploadEvent::Progress { session, fraction } => {
                self.session.on_progress(session, fraction);
            }
            UploadEvent::Completed { session, url } => {
                let result = self.session.on_transfer_result(
                    session,
                    Ok(url),
                    &mut self.recent,
                    &self.effects,
                );
                self.finish(result);
            }
            UploadEvent::Failed { session, error } => {
                let result = self.session.on_transfer_result(
                    session,
                    Err(error),
                    &mut self.recent,
                    &self.effects,
                );
                self.finish(result);
            }
        }
    }

    /// The UI has observed the terminal state, so the session goes back to idle.
    fn finish(&mut self, result: Result<TransferOutcome, UploadError>) {
        match result {
            Ok(TransferOutcome::Stale) => return,
            Ok(TransferOutcome::Succeeded {
                storage_warning, ..
            }) => {
                tracing::debug!(url = ?self.session.result_url(), "Upload finished");
                if let Some(warning) = storage_warning {
                    tracing::warn!(%warning, "Upload not saved to recent list");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Upload finished with error"),
        }
        self.session.reset();
    }

    fn subscription(&self) -> Subscription<Message> {
        let events = event::listen_with(|event, _status, _id| match event {
            Event::Window(window::Event::FileHovered(_)) => Some(Message::FileHovered),
            Event::Window(window::Event::FilesHoveredLeft) => Some(Message::FilesHoveredLeft),
            Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            Event::Keyboard(keyboard::Event::KeyPressed { key, modifiers, .. })
                if modifiers.command() =>
            {
                match key.as_ref() {
                    keyboard::Key::Character("o") => Some(Message::SelectFile),
                    keyboard::Key::Character("v") => Some(Message::CopyLastUpload),
                    keyboard::Key::Character("q") => Some(Message::Quit),
                    _ => None,
                }
            }
            _ => None,
        });

        let close_requests = window::close_requests().map(Message::CloseRequested);

        let tray = if self.tray.is_some() {
            time::every(TRAY_POLL_INTERVAL).map(|_| Message::TrayTick)
        } else {
            Subscription::none()
        };

        Subscription::batch([events, close_requests, tray])
    }

    fn view(&self) -> Element<'_, Message> {
        let status: Element<'_, Message> = match self.session.state() {
            SessionState::Transferring => {
                let name = self.session.file_name().unwrap_or_default();
                column![
                    row![
                        text(format!("Uploading {}", components::truncate_name(name))).size(12),
                        horizontal_space(),
                        button(text("Cancel").size(11))
                            .on_press(Message::CancelUpload)
                            .padding(2)
                            .style(style::cancel_button_style),
                    ]
                    .align_y(iced::Alignment::Center),
                    components::progress_bar(self.session.progress_percent()),
                ]
                .spacing(10)
                .into()
            }
            _ if self.is_drag_active => container(text("Start upload...").size(12))
                .padding([40, 12])
                .width(Length::Fill)
                .center_x(Length::Fill)
                .style(style::drop_zone_style)
                .into(),
            _ => container(text("Drop images here").size(12))
                .padding([40, 12])
                .width(Length::Fill)
                .center_x(Length::Fill)
                .style(style::drop_zone_style)
                .into(),
        };

        let divider = container(horizontal_space())
            .height(Length::Fixed(1.0))
            .width(Length::Fill)
            .style(style::divider_style);

        let menu = column![
            components::menu_item("Select file", "mod+o", Message::SelectFile),
            components::menu_item("Last upload", "mod+v", Message::CopyLastUpload),
            components::menu_item("Quit", "mod+q", Message::Quit),
        ]
        .spacing(2);

        let content = column![status, divider, menu, self.view_recent()]
            .spacing(12)
            .padding(12);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(style::window_style)
            .into()
    }

    fn view_recent(&self) -> Element<'_, Message> {
        let entries = self.recent.loaded();
        if entries.is_empty() {
            return column![].into();
        }

        let header = row![
            text("Recent").size(12),
            horizontal_space(),
            button(text("Clear").size(11))
                .on_press(Message::ClearRecent)
                .padding(2)
                .style(button::text),
        ]
        .align_y(iced::Alignment::Center);

        let items: Vec<Element<'_, Message>> = entries
            .iter()
            .map(|url| {
                button(text(url.as_str()).size(11))
                    .on_press(Message::CopyUpload(url.clone()))
                    .width(Length::Fill)
                    .padding([3, 10])
                    .style(style::menu_item_style)
                    .into()
            })
            .collect();

        column![header, Column::with_children(items).spacing(2)]
            .spacing(4)
            .into()
    }
}
