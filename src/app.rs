use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::model::config::Settings;
use crate::model::config_list::ConfigList;
use crate::model::environment::InstallEnvironment;
use crate::model::step::{PayloadPrompt, Step};
use crate::msg::Msg;
use crate::package::host;
use crate::package::installer::{InstallReport, PayloadCopy};
use crate::package::locate;
use crate::package::{InstallRequest, Installer, PathClassifier};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub struct App {
    pub step: Step,
    pub settings: Settings,
    env: InstallEnvironment,
    configs: ConfigList,
    classifier: PathClassifier,
    destination_input: String,
    destination: Option<PathBuf>,
    payload_input: String,
    payload_override: Option<PathBuf>,
    /// Set once the user declines to locate the payload; never re-prompted.
    aborted: bool,
    report: Option<InstallReport>,
    cancel: Arc<AtomicBool>,
    spinner: usize,
    pub notifications: VecDeque<String>,
    pub should_quit: bool,
    event_tx: mpsc::Sender<Msg>,
}

impl App {
    pub fn new(settings: Settings, env: InstallEnvironment, event_tx: mpsc::Sender<Msg>) -> Self {
        let destination_input = env
            .default_destination(&settings.package)
            .to_string_lossy()
            .into_owned();
        let payload_input = env.work_dir.to_string_lossy().into_owned();

        let mut app = Self {
            step: Step::Intro,
            settings,
            env,
            configs: ConfigList::default(),
            classifier: PathClassifier::default(),
            destination_input,
            destination: None,
            payload_input,
            payload_override: None,
            aborted: false,
            report: None,
            cancel: Arc::new(AtomicBool::new(false)),
            spinner: 0,
            notifications: VecDeque::new(),
            should_quit: false,
            event_tx,
        };
        app.rescan();
        app
    }

    /// Rediscover configuration directories. The classifier is rebuilt from
    /// the same scan so it never validates against stale roots.
    fn rescan(&mut self) {
        let dirs = self
            .env
            .layout
            .as_ref()
            .map(|layout| host::discover_configuration_dirs(layout, &self.settings.package))
            .unwrap_or_default();
        tracing::info!("{} Houdini configuration(s) available", dirs.len());

        self.configs = ConfigList::new(dirs);
        self.classifier = PathClassifier::scan(self.env.layout.as_ref(), &self.settings.package);
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key)?,
            Msg::InstallFinished(result) => self.finish_install(result),
            Msg::Tick => {
                if self.step == Step::Installing {
                    self.spinner = (self.spinner + 1) % SPINNER.len();
                }
            }
            Msg::Redraw => {}
        }
        Ok(())
    }

    fn enter(&mut self, step: Step) {
        tracing::debug!("wizard step: {} -> {}", self.step.label(), step.label());
        self.step = step;
    }

    fn next_step(&mut self) -> Result<()> {
        match self.step {
            Step::ChooseConfigs if self.configs.checked_count() == 0 => {
                self.push_notification("select at least one Houdini configuration".to_string());
                return Ok(());
            }
            Step::ChooseDestination => {
                if !self.accept_destination() {
                    return Ok(());
                }
            }
            Step::Confirm => return self.begin_install(),
            _ => {}
        }

        if let Some(next) = self.step.next() {
            self.enter(next);
        }
        Ok(())
    }

    fn prev_step(&mut self) {
        if let Some(prev) = self.step.prev() {
            self.enter(prev);
        }
    }

    fn request_quit(&mut self) {
        if self.step == Step::Installing {
            self.cancel.store(true, Ordering::SeqCst);
            self.push_notification("cancelling after the current configuration".to_string());
        } else {
            self.should_quit = true;
        }
    }

    fn push_notification(&mut self, message: String) {
        self.notifications.push_back(message);
        while self.notifications.len() > 8 {
            self.notifications.pop_front();
        }
    }

    fn accept_destination(&mut self) -> bool {
        let raw = self.destination_input.trim();
        if raw.is_empty() {
            self.push_notification("enter an installation path".to_string());
            return false;
        }

        let path = self.env.expand_user_path(raw);
        let verdict = self.classifier.classify(&path);
        if !verdict.is_accepted() {
            self.push_notification(format!(
                "invalid installation path: {}",
                verdict.explanation()
            ));
            return false;
        }

        tracing::info!("user selected installation path: {}", path.display());
        self.destination = Some(path);
        true
    }

    fn begin_install(&mut self) -> Result<()> {
        let payload = self.payload_override.clone().or_else(|| {
            locate::find_payload_path(&self.env.work_dir, &self.env.payload_source)
        });

        let Some(payload) = payload else {
            if self.aborted {
                self.fail("installation aborted: package base directory not located");
            } else {
                tracing::warn!("payload path not found, prompting user for path");
                self.enter(Step::LocatePayload(PayloadPrompt::Ask));
            }
            return Ok(());
        };

        let Some(destination) = self.destination.clone() else {
            self.fail("no installation path selected");
            return Ok(());
        };

        let name = &self.settings.package.name;
        let package = locate::find_package_path(&payload, name)
            .or_else(|| locate::find_package_path(&self.env.work_dir, name));

        let request = InstallRequest {
            targets: self.configs.checked_paths(),
            package_manifest: package,
            destination: Some(destination),
            payload: Some(payload),
            dry_run: self.settings.package.dry_run,
        };
        let installer = Installer::new(
            self.settings.package.clone(),
            self.env.work_dir.clone(),
            self.env.payload_source.clone(),
        )
        .with_cancel(Arc::clone(&self.cancel));

        spawn_install(installer, request, self.event_tx.clone())?;
        self.enter(Step::Installing);
        Ok(())
    }

    fn finish_install(&mut self, result: Result<InstallReport, String>) {
        match result {
            Ok(report) => {
                tracing::info!(
                    "installation complete: {} configuration(s)",
                    report.targets.len()
                );
                self.report = Some(report);
                self.enter(Step::Finished);
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!("installation failed: {reason}");
        self.enter(Step::Failed(reason));
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.request_quit();
            return Ok(());
        }

        match self.step.clone() {
            Step::Intro => match key.code {
                KeyCode::Enter | KeyCode::Right => self.next_step()?,
                KeyCode::Esc | KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            },
            Step::ChooseConfigs => self.handle_key_configs(key)?,
            Step::ChooseDestination => self.handle_key_destination(key)?,
            Step::Confirm => match key.code {
                KeyCode::Enter => self.next_step()?,
                KeyCode::Esc | KeyCode::Left => self.prev_step(),
                KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            },
            Step::LocatePayload(prompt) => self.handle_key_payload(prompt, key)?,
            Step::Installing => {}
            Step::Finished | Step::Failed(_) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q')) {
                    self.should_quit = true;
                }
            }
        }

        Ok(())
    }

    fn handle_key_configs(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.configs.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.configs.move_selection(-1),
            KeyCode::Char(' ') => self.configs.toggle_selected(),
            KeyCode::Char('a') => self.configs.toggle_all(),
            KeyCode::Char('r') => {
                self.rescan();
                let found = self.configs.items.len();
                self.push_notification(format!("found {found} Houdini configuration(s)"));
            }
            KeyCode::Enter | KeyCode::Right => self.next_step()?,
            KeyCode::Esc | KeyCode::Left => self.prev_step(),
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn handle_key_destination(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Enter => self.next_step()?,
            KeyCode::Esc => self.prev_step(),
            KeyCode::Backspace => {
                self.destination_input.pop();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.destination_input.push(ch);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_key_payload(&mut self, prompt: PayloadPrompt, key: KeyEvent) -> Result<()> {
        match prompt {
            PayloadPrompt::Ask => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.enter(Step::LocatePayload(PayloadPrompt::Enter));
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    tracing::info!("user aborted installation");
                    self.aborted = true;
                    self.begin_install()?;
                }
                _ => {}
            },
            PayloadPrompt::Enter => match key.code {
                KeyCode::Enter => self.submit_payload_path()?,
                KeyCode::Esc => self.enter(Step::LocatePayload(PayloadPrompt::Ask)),
                KeyCode::Backspace => {
                    self.payload_input.pop();
                }
                KeyCode::Char(ch)
                    if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
                {
                    self.payload_input.push(ch);
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn submit_payload_path(&mut self) -> Result<()> {
        let path = self.env.expand_user_path(&self.payload_input);
        match locate::validate_user_payload(&path) {
            Ok(path) => {
                tracing::info!("user supplied payload directory: {}", path.display());
                self.payload_override = Some(path);
                self.begin_install()
            }
            Err(rejection) => {
                tracing::error!("user supplied payload rejected: {rejection}");
                self.push_notification(rejection.to_string());
                Ok(())
            }
        }
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Min(1),    // page
                Constraint::Length(1), // notification
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.render_title_bar(frame, chunks[0]);
        self.render_page(frame, chunks[1]);
        self.render_notification(frame, chunks[2]);
        self.render_status_bar(frame, chunks[3]);
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(self.settings.wizard.title.clone())
            .alignment(Alignment::Center)
            .style(
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Rgb(15, 15, 24))
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(title, area);
    }

    fn render_page(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!(" {} ", self.step.label()))
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::Rgb(10, 10, 18)));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        match &self.step {
            Step::Intro => {
                let mut lines = vec![Line::from(self.settings.wizard.intro.clone())];
                if self.settings.package.dry_run {
                    lines.push(Line::default());
                    lines.push(warning_line(
                        "Dry run: nothing will be copied or written.",
                    ));
                }
                lines.push(Line::default());
                lines.push(dim_line("Press Enter to begin."));
                render_text(frame, inner, lines);
            }
            Step::ChooseConfigs => self.render_configs(frame, inner),
            Step::ChooseDestination => render_input(
                frame,
                inner,
                &self.settings.wizard.location,
                " Installation path ",
                &self.destination_input,
            ),
            Step::Confirm => render_text(frame, inner, self.confirm_lines()),
            Step::LocatePayload(PayloadPrompt::Ask) => render_text(
                frame,
                inner,
                vec![
                    warning_line("Package base directory not found!"),
                    Line::default(),
                    Line::from(format!(
                        "The installer was unable to find the base directory of the package. \
                         It should at a minimum contain a directory called /{}/.",
                        locate::PAYLOAD_MARKER
                    )),
                    Line::default(),
                    Line::from("Do you want to locate it manually? (y/n)"),
                ],
            ),
            Step::LocatePayload(PayloadPrompt::Enter) => render_input(
                frame,
                inner,
                "Enter the package base directory.",
                " Package base directory ",
                &self.payload_input,
            ),
            Step::Installing => render_text(
                frame,
                inner,
                vec![Line::from(format!(
                    "{} Installing {}...",
                    SPINNER[self.spinner], self.settings.package.name
                ))],
            ),
            Step::Finished => render_text(frame, inner, self.finished_lines()),
            Step::Failed(reason) => render_text(
                frame,
                inner,
                vec![
                    Line::from(Span::styled(
                        "Installation failed.",
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )),
                    Line::default(),
                    Line::from(reason.clone()),
                    Line::default(),
                    dim_line(&format!(
                        "Please see the log at {} for details.",
                        self.env.log_path.display()
                    )),
                ],
            ),
        }
    }

    fn render_configs(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1)])
            .split(area);

        render_text(
            frame,
            chunks[0],
            vec![Line::from(self.settings.wizard.chooser.clone())],
        );

        if self.configs.is_empty() {
            let root = self
                .env
                .layout
                .as_ref()
                .map(|layout| layout.root.display().to_string())
                .unwrap_or_else(|| "an unknown location".to_string());
            render_text(
                frame,
                chunks[1],
                vec![warning_line(&format!(
                    "No compatible Houdini configurations found under {root}. Press r to rescan."
                ))],
            );
            return;
        }

        let height = chunks[1].height.max(1) as usize;
        let first = self.configs.selected.saturating_sub(height - 1);
        let lines: Vec<Line> = self
            .configs
            .items
            .iter()
            .enumerate()
            .skip(first)
            .take(height)
            .map(|(idx, item)| {
                let mark = if item.checked { "[x]" } else { "[ ]" };
                let label = format!("{mark} {}  ({})", item.dir.display_path(), item.dir.version);
                if idx == self.configs.selected {
                    Line::from(Span::styled(
                        format!("> {label}"),
                        Style::default().fg(Color::Black).bg(Color::Cyan),
                    ))
                } else {
                    Line::from(Span::styled(
                        format!("  {label}"),
                        Style::default().fg(Color::Gray),
                    ))
                }
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), chunks[1]);
    }

    fn confirm_lines(&self) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(
            "The package will be installed for the following Houdini configurations:",
        )];
        lines.extend(
            self.configs
                .items
                .iter()
                .filter(|item| item.checked)
                .map(|item| Line::from(format!("  {}", item.dir.display_path()))),
        );
        lines.push(Line::default());
        lines.push(Line::from(
            "The package files will be installed to this location:",
        ));
        let destination = self
            .destination
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        lines.push(Line::from(format!("  {destination}")));
        lines.push(Line::default());
        if self.settings.package.dry_run {
            lines.push(warning_line("Dry run: nothing will be copied or written."));
        }
        lines.push(dim_line("Press Enter to complete the installation."));
        lines
    }

    fn finished_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        let Some(report) = &self.report else {
            return lines;
        };

        if report.dry_run {
            lines.push(warning_line(
                "Dry run complete. Nothing was copied or written.",
            ));
        } else {
            lines.push(Line::from(Span::styled(
                "The package has been successfully installed.",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::default());
        lines.push(Line::from(format!("Install path: {}", report.install_path)));
        lines.push(Line::from(match report.payload_copy {
            PayloadCopy::NotNeeded => "Payload: used in place".to_string(),
            PayloadCopy::Copied => "Payload: copied to install path".to_string(),
            PayloadCopy::SkippedDryRun => "Payload: copy skipped".to_string(),
        }));
        if let Some(hpath) = report.manifest.hpath() {
            lines.push(Line::from(format!("hpath: {hpath}")));
        }
        lines.push(Line::default());
        for target in &report.targets {
            let verb = if target.written { "wrote" } else { "would write" };
            let note = if target.created_packages_dir {
                " (new packages directory)"
            } else {
                ""
            };
            lines.push(Line::from(format!(
                "  {verb} {}{note}",
                target.package_file.display()
            )));
        }
        lines.push(Line::default());
        lines.push(dim_line(&format!(
            "Installation log saved to: {}",
            self.env.log_path.display()
        )));
        lines
    }

    fn render_notification(&self, frame: &mut Frame, area: Rect) {
        let text = self.notifications.back().cloned().unwrap_or_default();
        let notice = Paragraph::new(format!(" {text}")).style(Style::default().fg(Color::Yellow));
        frame.render_widget(notice, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let step_style = match self.step {
            Step::Finished => Style::default().fg(Color::Black).bg(Color::Green),
            Step::Failed(_) => Style::default().fg(Color::Black).bg(Color::Red),
            Step::LocatePayload(_) => Style::default().fg(Color::Black).bg(Color::Yellow),
            _ => Style::default().fg(Color::Black).bg(Color::Magenta),
        }
        .add_modifier(Modifier::BOLD);

        let step_span = Span::styled(format!(" {} ", self.step.label()), step_style);
        let dry_run = if self.settings.package.dry_run {
            " [dry run]"
        } else {
            ""
        };
        let info = Span::styled(
            format!(" {}{dry_run} ", self.key_hints()),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let bar = Line::from(vec![step_span, info]);
        let status = Paragraph::new(bar).style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }

    fn key_hints(&self) -> &'static str {
        match self.step {
            Step::Intro => "Enter: next  q: quit",
            Step::ChooseConfigs => {
                "j/k: move  Space: toggle  a: all  r: rescan  Enter: next  Esc: back"
            }
            Step::ChooseDestination => "type a path  Enter: next  Esc: back",
            Step::Confirm => "Enter: install  Esc: back",
            Step::LocatePayload(PayloadPrompt::Ask) => "y: locate manually  n: abort",
            Step::LocatePayload(PayloadPrompt::Enter) => "Enter: use path  Esc: back",
            Step::Installing => "Ctrl-C: cancel after the current configuration",
            Step::Finished | Step::Failed(_) => "Enter: exit",
        }
    }
}

fn render_text(frame: &mut Frame, area: Rect, lines: Vec<Line<'static>>) {
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

fn render_input(frame: &mut Frame, area: Rect, prompt: &str, title: &str, value: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);

    render_text(frame, chunks[0], vec![Line::from(prompt.to_string())]);

    let input = Paragraph::new(value.to_string()).block(
        Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::Rgb(15, 15, 24))),
    );
    frame.render_widget(input, chunks[1]);

    let cursor_x = (chunks[1].x + 1 + value.chars().count() as u16)
        .min(chunks[1].x + chunks[1].width.saturating_sub(2));
    let cursor_y = chunks[1].y + 1;
    frame.set_cursor_position((cursor_x, cursor_y));
}

fn dim_line(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    ))
}

fn warning_line(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Yellow),
    ))
}

fn spawn_install(
    mut installer: Installer,
    request: InstallRequest,
    tx: mpsc::Sender<Msg>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("installer".to_string())
        .spawn(move || {
            let result = installer.install(&request).map_err(|err| err.to_string());
            tracing::debug!("installer stopped in phase {:?}", installer.phase());
            if tx.send(Msg::InstallFinished(result)).is_err() {
                tracing::warn!("wizard closed before installation finished");
            }
        })?;
    Ok(())
}
