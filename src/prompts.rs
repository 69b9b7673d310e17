pub const ANALYZE_IMAGE_PROMPT: &str = "Проанализируй это изображение.";

pub const PROMPT_TASK_INSTRUCTION: &str = "АНАЛИЗ ИЗОБРАЖЕНИЯ ДЛЯ ПРОМПТА. ВЫВОД: ТОЛЬКО АНГЛИЙСКИЙ ЯЗЫК, КЛЮЧЕВЫЕ СЛОВА, ЧЕРЕЗ ЗАПЯТУЮ. БЕЗ ОБЪЯСНЕНИЙ. НАЧАТЬ С 'masterpiece, best quality'.";

pub const ANALYSIS_TASK_INSTRUCTION: &str = "Твоя роль: высокоточный мультидисциплинарный аналитик. Проведи исчерпывающий и объективный анализ изображения на русском языке. Структура отчета: 1. **Общая сводка**, 2. **Ключевые объекты**, 3. **Окружение и фон**, 4. **Детали и надписи**, 5. **Предположительный контекст**.";

pub const TRANSLATION_TASK_INSTRUCTION: &str = "Извлеки весь текст с изображения и дословно переведи его на русский. Твой ответ должен содержать ТОЛЬКО переведенный текст. Если текста нет, напиши 'Текст не найден'.";

pub const DRAW_PROMPT_PREFIX: &str = "Generate a high-quality, masterpiece, 8k, detailed image of: ";

pub fn draw_prompt(user_text: &str) -> String {
    format!("{DRAW_PROMPT_PREFIX}{user_text}")
}

pub fn redraw_instruction(caption: &str) -> String {
    format!("Перерисуй это изображение, следуя инструкции: '{caption}'")
}

/// Photo tasks reachable from the main menu. Each one runs the same
/// describe-then-instruct exchange with a different instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoTask {
    Prompt,
    Analysis,
    Translation,
}

impl PhotoTask {
    pub fn name(self) -> &'static str {
        match self {
            PhotoTask::Prompt => "prompt",
            PhotoTask::Analysis => "analysis",
            PhotoTask::Translation => "translation",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            PhotoTask::Prompt => PROMPT_TASK_INSTRUCTION,
            PhotoTask::Analysis => ANALYSIS_TASK_INSTRUCTION,
            PhotoTask::Translation => TRANSLATION_TASK_INSTRUCTION,
        }
    }

    /// Text sent back when the menu button is pressed, asking for the photo.
    pub fn request_text(self) -> &'static str {
        match self {
            PhotoTask::Prompt => "Отправь фото, чтобы получить готовый промпт.",
            PhotoTask::Analysis => "Отправь фото для детального анализа.",
            PhotoTask::Translation => "Отправь фото с текстом для перевода.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_prompt_keeps_the_full_user_text() {
        let prompt = draw_prompt("нарисуй кота в шляпе");
        assert!(prompt.starts_with(DRAW_PROMPT_PREFIX));
        assert!(prompt.ends_with("нарисуй кота в шляпе"));
    }

    #[test]
    fn each_task_has_its_own_instruction() {
        assert_ne!(
            PhotoTask::Prompt.instruction(),
            PhotoTask::Analysis.instruction()
        );
        assert_ne!(
            PhotoTask::Analysis.instruction(),
            PhotoTask::Translation.instruction()
        );
        assert_eq!(PhotoTask::Translation.name(), "translation");
    }
}
